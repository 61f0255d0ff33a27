//! Example: trampoline TCP echo server.
//!
//! Run with `cargo run --example echo_server`, then poke it with
//! `nc localhost 8869`. Every byte sent comes straight back. Stop with
//! Ctrl+C; the listening socket is closed as the process exits.

use bounce::{Acceptor, Builder, Listener};

fn main() -> std::io::Result<()> {
    env_logger::init();

    // Dual-stack listening socket on the reference port.
    let listener = Listener::bind("localhost", 8869)?;
    println!("Echo server listening on {}", listener.local_addr()?);

    let mut tramp = Builder::new().max_tasks(256).build();
    tramp.spawn(Acceptor::echo(listener)).unwrap();

    tramp.run()
}
