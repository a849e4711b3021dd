//! TCP server - framed transport around the single-threaded gateway.
//!
//! One task owns the gateway (and with it the engine); per-connection
//! reader tasks decode length-framed records and forward them over an
//! mpsc channel, so every submit/cancel/query executes in order on one
//! task. Outbound frames travel through per-connection writer channels;
//! a slow or dead consumer never stalls the engine, and write errors
//! are logged and dropped.

use std::io;

use rustc_hash::FxHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{tcp::OwnedReadHalf, TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::gateway::{ConnId, Gateway};
use crate::protocol::{MessageHeader, HEADER_LEN, MAX_FRAME_LEN};

enum Event {
    Connected(ConnId, mpsc::UnboundedSender<Vec<u8>>),
    Frame(ConnId, Vec<u8>),
    Disconnected(ConnId),
}

/// Accept connections until ctrl-c, then drain and stop.
pub async fn run(listener: TcpListener, mut gateway: Gateway) -> io::Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    // The engine task: sole owner of all matching state.
    let engine_task = tokio::spawn(async move {
        let mut writers: FxHashMap<ConnId, mpsc::UnboundedSender<Vec<u8>>> =
            FxHashMap::default();
        while let Some(event) = event_rx.recv().await {
            match event {
                Event::Connected(conn, writer) => {
                    writers.insert(conn, writer);
                    gateway.on_connect(conn);
                }
                Event::Frame(conn, bytes) => {
                    for (dest, frame) in gateway.on_frame(conn, &bytes) {
                        if let Some(writer) = writers.get(&dest) {
                            let _ = writer.send(frame);
                        }
                    }
                }
                Event::Disconnected(conn) => {
                    writers.remove(&conn);
                    gateway.on_disconnect(conn);
                }
            }
        }
    });

    let mut next_conn: ConnId = 1;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let conn = next_conn;
                        next_conn += 1;
                        debug!(conn, %peer, "accepted connection");
                        spawn_connection(conn, socket, event_tx.clone());
                    }
                    Err(err) => warn!(%err, "accept failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, no longer accepting connections");
                break;
            }
        }
    }

    // Dropping the last sender ends the engine task once in-flight
    // requests finish.
    drop(event_tx);
    let _ = engine_task.await;
    Ok(())
}

fn spawn_connection(conn: ConnId, socket: TcpStream, events: mpsc::UnboundedSender<Event>) {
    let (reader, mut writer) = socket.into_split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    if events.send(Event::Connected(conn, write_tx)).is_err() {
        return;
    }

    // Writer half: outbound frames, best effort.
    tokio::spawn(async move {
        while let Some(frame) = write_rx.recv().await {
            if let Err(err) = writer.write_all(&frame).await {
                debug!(conn, %err, "outbound write failed");
                break;
            }
        }
    });

    // Reader half: length-framed records.
    tokio::spawn(async move {
        read_frames(conn, reader, &events).await;
        let _ = events.send(Event::Disconnected(conn));
    });
}

async fn read_frames(conn: ConnId, mut reader: OwnedReadHalf, events: &mpsc::UnboundedSender<Event>) {
    loop {
        let mut header = [0u8; HEADER_LEN];
        if reader.read_exact(&mut header).await.is_err() {
            debug!(conn, "connection closed");
            return;
        }

        let Ok(parsed) = MessageHeader::decode(&header) else {
            return;
        };
        let len = parsed.msg_len as usize;
        if !(HEADER_LEN..=MAX_FRAME_LEN).contains(&len) {
            warn!(conn, len, "bad frame length, dropping connection");
            return;
        }

        let mut frame = vec![0u8; len];
        frame[..HEADER_LEN].copy_from_slice(&header);
        if reader.read_exact(&mut frame[HEADER_LEN..]).await.is_err() {
            warn!(conn, "connection closed mid-frame");
            return;
        }

        if events.send(Event::Frame(conn, frame)).is_err() {
            return;
        }
    }
}
