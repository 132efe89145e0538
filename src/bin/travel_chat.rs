//! Interactive terminal client for the accessible travel assistant.
//! Run with: cargo run --bin travel-chat

use std::process::ExitCode;

use accessible_travel_chat::start_travel_chat;

fn main() -> ExitCode {
    start_travel_chat::run_client()
}
