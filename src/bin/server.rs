//! Development backend for the travel chat client.
//! Run with: cargo run --bin travel-chat-server

use std::process::ExitCode;

use accessible_travel_chat::start_travel_chat;

fn main() -> ExitCode {
    start_travel_chat::run_server()
}
