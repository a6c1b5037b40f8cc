// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-channel listener.
//!
//! Accepts connections on a Unix socket (always) and TCP (when
//! configured), reads `{method, params}` frames, and dispatches into the
//! manager loop. Allowed-items queries are answered here directly; every
//! state-touching method goes through the manager for ordering.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use runq_wire::{decode, read_message, write_reply, ProtocolError, Reply, Request};

use crate::env;
use crate::manager::ManagerHandle;
use crate::permissions::Permissions;

/// Shared context for all connection handlers.
pub struct ListenCtx {
    pub manager: ManagerHandle,
    pub permissions: Arc<Permissions>,
    /// Pre-shared key required from TCP clients when set.
    pub control_key: Option<String>,
}

/// Where a connection came from, for auth decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSource {
    /// Local Unix socket — trusted, no key required.
    Unix,
    /// Remote TCP — must present the pre-shared key when one is set.
    Tcp,
}

pub struct Listener {
    unix: UnixListener,
    tcp: Option<TcpListener>,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, tcp: Option<TcpListener>, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, tcp, ctx }
    }

    /// Accept connections until cancelled, spawning a task per connection.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.unix.accept() => match result {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            if let Err(err) =
                                handle_connection(stream, ConnectionSource::Unix, ctx).await
                            {
                                log_connection_error(err);
                            }
                        });
                    }
                    Err(err) => error!(%err, "unix accept error"),
                },
                result = accept_tcp(self.tcp.as_ref()) => match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "tcp connection");
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            if let Err(err) =
                                handle_connection(stream, ConnectionSource::Tcp, ctx).await
                            {
                                log_connection_error(err);
                            }
                        });
                    }
                    Err(err) => error!(%err, "tcp accept error"),
                },
            }
        }
    }
}

async fn accept_tcp(
    tcp: Option<&TcpListener>,
) -> std::io::Result<(tokio::net::TcpStream, std::net::SocketAddr)> {
    match tcp {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

fn log_connection_error(err: ProtocolError) {
    match err {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => warn!("connection timeout"),
        other => error!(%other, "connection error"),
    }
}

/// Serve one connection: a loop of request/reply frames.
///
/// A request for which the manager produces no reply (it was killed or
/// stopped) drops the connection, so the client observes a timeout rather
/// than a fabricated response.
pub async fn handle_connection<S>(
    stream: S,
    source: ConnectionSource,
    ctx: Arc<ListenCtx>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    loop {
        let envelope = match read_message(&mut reader)
            .await
            .and_then(|bytes| decode::<runq_wire::Envelope>(&bytes))
        {
            Ok(envelope) => envelope,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(err) => return Err(err),
        };
        debug!(method = %envelope.method, "received request");

        let Some(reply) = dispatch(envelope, source, &ctx).await else {
            return Ok(());
        };
        write_reply(&mut writer, &reply, env::ipc_timeout()).await?;
    }
}

async fn dispatch(
    envelope: runq_wire::Envelope,
    source: ConnectionSource,
    ctx: &ListenCtx,
) -> Option<Reply> {
    if source == ConnectionSource::Tcp {
        if let Some(expected) = &ctx.control_key {
            if envelope.key() != Some(expected.as_str()) {
                return Some(Reply::fail("unauthorized"));
            }
        }
    }

    let request = match Request::try_from(envelope) {
        Ok(request) => request,
        Err(err) => return Some(Reply::fail(err.to_string())),
    };

    match request {
        Request::PlansAllowed(params) => {
            Some(match ctx.permissions.plans_allowed(&params.user_group) {
                Ok(plans) => Reply::ok().with("plans_allowed", plans),
                Err(err) => Reply::fail(err.to_string()),
            })
        }
        Request::DevicesAllowed(params) => {
            Some(match ctx.permissions.devices_allowed(&params.user_group) {
                Ok(devices) => Reply::ok().with("devices_allowed", devices),
                Err(err) => Reply::fail(err.to_string()),
            })
        }
        Request::PermissionsReload => Some(match ctx.permissions.reload() {
            Ok(()) => Reply::ok().with_msg("permissions reloaded"),
            Err(err) => Reply::fail(err.to_string()),
        }),
        other => ctx.manager.request(other).await,
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
