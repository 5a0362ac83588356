use std::collections::HashMap;

use eppo_assignment::{AssignmentEvent, ClientConfig};

pub fn main() -> eppo_assignment::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("eppo")).init();

    let api_key = std::env::var("EPPO_API_KEY").unwrap();
    let client = ClientConfig::from_api_key(api_key)
        .assignment_logger(|event: AssignmentEvent| {
            println!("Assignment event: {}", serde_json::to_string(&event).unwrap_or_default());
        })
        .to_client();

    // Start a poller thread to fetch configuration from the server.
    let poller = client.start_poller_thread()?;

    // Block waiting for configuration. Until this call returns, the client will return None for all
    // assignments.
    if let Err(err) = poller.wait_for_configuration() {
        println!("Failed to fetch configuration: {:?}", err);
    }

    // Get assignment for test-subject.
    let assignment = client
        .get_boolean_assignment("a-boolean-flag", "test-subject", &HashMap::new())
        .unwrap_or_default()
        // default assignment
        .unwrap_or(false);

    println!("Assignment: {:?}", assignment);

    poller.shutdown()
}
