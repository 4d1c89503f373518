use std::sync::Arc;

use statwolf::{ClientConfig, MockTransport, StatwolfClient};

pub const BASE: &str = "/root/v1/full";

pub fn path(endpoint: &str) -> String {
    format!("{}{}", BASE, endpoint)
}

/// A client rooted at `/root` talking to a fresh mock transport
#[allow(dead_code)]
pub fn mock_client() -> (StatwolfClient, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::new());
    let config = ClientConfig::new("https://a.statwolf.endpoint/root", "the user", "a real password");
    let client = StatwolfClient::with_transport(config, mock.clone()).unwrap();
    (client, mock)
}
