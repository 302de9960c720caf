use anyhow::{Context, Result};
use serde_json::Deserializer;
use thread_scope_api as api;

fn main() -> Result<()> {
    // Create frontend socket in a temporary directory, print it for the parent backend.
    let socket_dir = tempfile::TempDir::new()
        .context("Failed to create temporary directory for frontend socket")?;
    let socket_path = socket_dir.path().join("thread-scope-frontend.socket");
    let listener = std::os::unix::net::UnixListener::bind(&socket_path)
        .context("Failed to bind frontend socket")?;
    println!("{}", socket_path.display());

    // Deserialize api::Timelines from socket and print a line per
    // thread to stderr.
    let (socket, _addr) = listener.accept().context("Failed to accept()")?;
    let stream = Deserializer::from_reader(socket).into_iter::<api::Timeline>();
    for timeline in stream {
        let timeline = timeline.context("Failed to deserialize timeline")?;
        match timeline.window {
            Some(w) => eprintln!(
                "ticks {}..{} (trigger: {:?}, up to {} switch(es) per tick)",
                w.start, w.end, timeline.trigger, timeline.max_step_count
            ),
            None => eprintln!("no switches recorded"),
        }
        for thread in &timeline.threads {
            eprintln!(
                "#{} {} (prio {}{}): {:?}",
                thread.id,
                thread.name,
                thread.priority,
                if thread.logged { "" } else { ", partial" },
                thread
                    .data
                    .drawables()
                    .map(|i| (i.begin, i.end()))
                    .collect::<Vec<_>>()
            );
        }
    }

    Ok(())
}
