// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rate-limit identity of the calling peer.
//!
//! The bucket is the peer IP from [`ConnectInfo`], which the server installs
//! via `into_make_service_with_connect_info`. Request headers and bodies are
//! never consulted, so a caller cannot pick a fresh bucket per request.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};

/// Bucket shared by requests that arrive without connection info.
pub const UNKNOWN_PEER: &str = "unknown-peer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Port dropped: reconnecting must not open a new window.
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_PEER.to_string());
        Ok(ClientAddr(peer))
    }
}
