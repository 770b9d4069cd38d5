// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP client construction with a consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Creates an HTTP client builder with the standard Warden User-Agent
/// header.
///
/// Use this when you need to customize the client (e.g., set a timeout).
pub(crate) fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Returns the standard Warden User-Agent string.
///
/// Format: `warden-runtime/{version}`
pub(crate) fn user_agent() -> String {
	format!("warden-runtime/{}", env!("CARGO_PKG_VERSION"))
}
