//! Integration test common infrastructure.
//!
//! Provides a scripted fake IRC server, a call-counting connector and a
//! helper that serves the registration API on an ephemeral port.

pub mod api;
pub mod server;
pub mod stub;

#[allow(unused_imports)]
pub use api::TestApi;
#[allow(unused_imports)]
pub use server::{FakeIrcServer, Session};
#[allow(unused_imports)]
pub use stub::CountingConnector;

use slirc_relay::ServerIdentity;

/// The identity used throughout the tests, pointed at `port`.
#[allow(dead_code)]
pub fn identity(port: u16) -> ServerIdentity {
    ServerIdentity {
        host: "localhost".into(),
        port,
        password: None,
        nickname: "bot".into(),
        realname: "IRC Bot".into(),
        appname: "app".into(),
        messageurl: "http://cb/".into(),
    }
}
