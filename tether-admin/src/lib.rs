//! Tether Admin Control Plane
//!
//! Handles Unix socket connections and ProtoBuf deserialization for
//! inspecting the live routing state: retained generations, table dumps and
//! dry-run routing decisions. The message schema lives in [`proto`].

pub mod proto;

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::Arc;

use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_stream::wrappers::UnixListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use tether_core::{Backend, Decision, Generation, RouteState, RoutingHandle, Table};

use proto::admin_request::Command;
use proto::{AdminReply, AdminRequest, DumpReply, RouteReply, RouteStateKind, StatusReply};

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors raised while running or calling the admin socket.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Socket setup or I/O failed.
    #[error("admin socket I/O error: {0}")]
    Io(#[from] io::Error),

    /// Something other than a socket already occupies the path.
    #[error("refusing to replace non-socket file at {0}")]
    PathOccupied(String),

    /// A frame did not hold a valid message.
    #[error("malformed admin message: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A frame exceeded [`MAX_FRAME_LEN`].
    #[error("admin frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    /// The peer closed the connection before replying.
    #[error("admin connection closed before a reply arrived")]
    Closed,
}

/// Execute one admin request against the live router.
pub fn handle_request(handle: &RoutingHandle, request: AdminRequest) -> AdminReply {
    match request.command {
        Some(Command::Status(_)) => AdminReply::status(status(handle)),
        Some(Command::Dump(dump_request)) => dump(handle, dump_request.generation),
        Some(Command::Route(route_request)) => {
            route(handle, &route_request.key, route_request.token.as_deref())
        }
        None => AdminReply::error("request carried no command"),
    }
}

fn ids(backends: &[Backend]) -> Vec<String> {
    backends.iter().map(|b| b.id.clone()).collect()
}

fn member_ids(table: &Table) -> Vec<String> {
    ids(table.backends())
}

fn slot_ids(table: &Table) -> Vec<String> {
    (0..table.table_size())
        .filter_map(|slot| table.owner_of(slot))
        .map(|b| b.id.clone())
        .collect()
}

fn status(handle: &RoutingHandle) -> StatusReply {
    match handle {
        RoutingHandle::Versioned { router, .. } => {
            let current = router.current();
            StatusReply {
                mode: String::from("versioned"),
                generation: current.as_ref().map(|(generation, _)| generation.0),
                retained: router.generations().into_iter().map(|g| g.0).collect(),
                max_history: router.max_history() as u64,
                backends: current.map(|(_, table)| member_ids(&table)).unwrap_or_default(),
            }
        }
        RoutingHandle::Simple(dispatcher) => StatusReply {
            mode: String::from("simple"),
            backends: member_ids(&dispatcher.snapshot()),
            ..StatusReply::default()
        },
    }
}

fn dump(handle: &RoutingHandle, generation: Option<u64>) -> AdminReply {
    match handle {
        RoutingHandle::Versioned { router, .. } => {
            let found = match generation {
                Some(g) => router.table(Generation(g)).map(|table| (Generation(g), table)),
                None => router.current(),
            };
            match found {
                Some((generation, table)) => AdminReply::dump(DumpReply {
                    generation: Some(generation.0),
                    slots: slot_ids(&table),
                }),
                None => AdminReply::error("generation not retained"),
            }
        }
        RoutingHandle::Simple(dispatcher) => match generation {
            None => AdminReply::dump(DumpReply {
                generation: None,
                slots: slot_ids(&dispatcher.snapshot()),
            }),
            Some(_) => AdminReply::error("simple mode has no generations"),
        },
    }
}

fn route(handle: &RoutingHandle, key: &str, token: Option<&str>) -> AdminReply {
    match handle.route(key, token) {
        Ok(Decision::Versioned(result)) => {
            let state = match result.state() {
                RouteState::Fresh => RouteStateKind::Fresh,
                RouteState::Stable => RouteStateKind::Stable,
                RouteState::Migrating => RouteStateKind::Migrating,
            };
            AdminReply::route(RouteReply {
                state: state as i32,
                primary: result.primary.id.clone(),
                peers: ids(&result.peers),
                generation: Some(result.generation.0),
                previous_primary: result.previous_primary.as_ref().map(|b| b.id.clone()),
                previous_peers: ids(&result.previous_peers),
            })
        }
        Ok(Decision::Simple(backend)) => AdminReply::route(RouteReply {
            state: RouteStateKind::Direct as i32,
            primary: backend.id,
            ..RouteReply::default()
        }),
        Err(err) => AdminReply::error(err.to_string()),
    }
}

async fn write_frame<W, M>(writer: &mut W, message: &M) -> Result<(), AdminError>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let bytes = message.encode_to_vec();
    if bytes.len() > MAX_FRAME_LEN {
        return Err(AdminError::FrameTooLarge(bytes.len()));
    }
    // bounded by MAX_FRAME_LEN, so it fits
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame; `None` when the peer closed cleanly between frames.
async fn read_frame<R, M>(reader: &mut R) -> Result<Option<M>, AdminError>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(AdminError::FrameTooLarge(len));
    }

    let mut buf = vec![0; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(M::decode(buf.as_slice())?))
}

/// Serve the admin protocol on a Unix socket at `path` until an accept fails.
///
/// A stale socket left at `path` by a previous run is replaced.
pub async fn serve(path: impl AsRef<Path>, handle: RoutingHandle) -> Result<(), AdminError> {
    let path = path.as_ref();
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if !metadata.file_type().is_socket() {
            return Err(AdminError::PathOccupied(path.display().to_string()));
        }
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "admin socket listening");

    let handle = Arc::new(handle);
    let mut incoming = UnixListenerStream::new(listener);
    while let Some(stream) = incoming.next().await {
        let stream = stream?;
        let handle = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &handle).await {
                warn!(error = %err, "admin connection failed");
            }
        });
    }
    Ok(())
}

async fn handle_connection(mut stream: UnixStream, handle: &RoutingHandle) -> Result<(), AdminError> {
    while let Some(request) = read_frame::<_, AdminRequest>(&mut stream).await? {
        debug!(?request, "admin command");
        let reply = handle_request(handle, request);
        write_frame(&mut stream, &reply).await?;
    }
    Ok(())
}

/// Send one request to the admin socket at `path` and wait for its reply.
pub async fn call(path: impl AsRef<Path>, request: &AdminRequest) -> Result<AdminReply, AdminError> {
    let mut stream = UnixStream::connect(path).await?;
    write_frame(&mut stream, request).await?;
    read_frame(&mut stream).await?.ok_or(AdminError::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::admin_reply::Reply;
    use tether_core::{Dispatcher, TableBuilder, VersionedRouter};

    fn versioned() -> RoutingHandle {
        let router = Arc::new(VersionedRouter::new(3));
        let builder = TableBuilder::new(7);
        router.add_generation(Generation(1), builder.build(vec![Backend::new("A")]).unwrap());
        router.add_generation(Generation(2), builder.build(vec![Backend::new("B")]).unwrap());
        RoutingHandle::Versioned {
            router,
            replica_count: 2,
            max_jumps: 7,
        }
    }

    fn simple() -> RoutingHandle {
        let table = TableBuilder::new(7).build(vec![Backend::new("A")]).unwrap();
        RoutingHandle::Simple(Arc::new(Dispatcher::new(table)))
    }

    fn error_message(reply: AdminReply) -> String {
        match reply.reply {
            Some(Reply::Error(err)) => err.message,
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    #[test]
    fn test_status_lists_generations() {
        let Some(Reply::Status(status)) = handle_request(&versioned(), AdminRequest::status()).reply
        else {
            panic!("expected a status reply");
        };
        assert_eq!(status.mode, "versioned");
        assert_eq!(status.generation, Some(2));
        assert_eq!(status.retained, vec![1, 2]);
        assert_eq!(status.max_history, 3);
        assert_eq!(status.backends, vec!["B".to_string()]);
    }

    #[test]
    fn test_status_before_first_generation() {
        let handle = RoutingHandle::Versioned {
            router: Arc::new(VersionedRouter::new(3)),
            replica_count: 2,
            max_jumps: 7,
        };
        let Some(Reply::Status(status)) = handle_request(&handle, AdminRequest::status()).reply
        else {
            panic!("expected a status reply");
        };
        assert_eq!(status.generation, None);
        assert!(status.backends.is_empty());

        let reply = handle_request(&handle, AdminRequest::route("room-1", None));
        assert_eq!(error_message(reply), "no routing generation installed");
    }

    #[test]
    fn test_dump_by_generation() {
        let handle = versioned();
        let Some(Reply::Dump(dump)) = handle_request(&handle, AdminRequest::dump(Some(1))).reply
        else {
            panic!("expected a dump reply");
        };
        assert_eq!(dump.generation, Some(1));
        assert_eq!(dump.slots, vec!["A"; 7]);

        let Some(Reply::Dump(current)) = handle_request(&handle, AdminRequest::dump(None)).reply
        else {
            panic!("expected a dump reply");
        };
        assert_eq!(current.generation, Some(2));
        assert_eq!(current.slots, vec!["B"; 7]);

        let reply = handle_request(&handle, AdminRequest::dump(Some(9)));
        assert_eq!(error_message(reply), "generation not retained");
    }

    #[test]
    fn test_route_reports_handoff() {
        let reply = handle_request(&versioned(), AdminRequest::route("room-1", Some("1".into())));
        let Some(Reply::Route(route)) = reply.reply else {
            panic!("expected a route reply");
        };
        assert_eq!(route.state(), RouteStateKind::Migrating);
        assert_eq!(route.primary, "B");
        assert_eq!(route.generation, Some(2));
        assert_eq!(route.previous_primary.as_deref(), Some("A"));
    }

    #[test]
    fn test_simple_mode() {
        let handle = simple();
        let Some(Reply::Route(route)) =
            handle_request(&handle, AdminRequest::route("room-1", Some("3".into()))).reply
        else {
            panic!("expected a route reply");
        };
        assert_eq!(route.state(), RouteStateKind::Direct);
        assert_eq!(route.primary, "A");
        assert_eq!(route.generation, None);

        let Some(Reply::Status(status)) = handle_request(&handle, AdminRequest::status()).reply
        else {
            panic!("expected a status reply");
        };
        assert_eq!(status.mode, "simple");

        let reply = handle_request(&handle, AdminRequest::dump(Some(1)));
        assert_eq!(error_message(reply), "simple mode has no generations");
    }

    #[test]
    fn test_request_without_command() {
        let reply = handle_request(&versioned(), AdminRequest::default());
        assert_eq!(error_message(reply), "request carried no command");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut frame: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        let err = read_frame::<_, AdminRequest>(&mut frame).await.unwrap_err();
        assert!(matches!(err, AdminError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_clean_close_between_frames() {
        let mut frame: &[u8] = &[];
        let read = read_frame::<_, AdminRequest>(&mut frame).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_serve_over_socket() {
        let path = std::env::temp_dir().join(format!("tether-admin-{}.sock", std::process::id()));
        let server = tokio::spawn(serve(path.clone(), versioned()));

        let mut reply = None;
        for _ in 0..50 {
            if let Ok(r) = call(&path, &AdminRequest::dump(Some(1))).await {
                reply = Some(r);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let Some(Reply::Dump(dump)) = reply.expect("admin socket never came up").reply else {
            panic!("expected a dump reply");
        };
        assert_eq!(dump.slots, vec!["A"; 7]);

        server.abort();
        let _ = std::fs::remove_file(&path);
    }
}
