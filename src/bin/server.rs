//! Talk room HTTP server.
//! Run with: cargo run --bin talk-room-server

use std::process::ExitCode;

use talk_room::start_talk_room;

fn main() -> ExitCode {
    start_talk_room::run()
}
