use confwatch::{ConfResult, EtcdConfig};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::args::WatchArgs;

pub async fn run(client: &EtcdConfig, args: WatchArgs) -> ConfResult<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.watch(&args.key, move |key, value| {
        let _ = tx.send(format!("{key} = {value}"));
    });
    info!(key = %args.key, "watching (Ctrl+C to exit)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0usize;
    while args.count.map_or(true, |n| seen < n) {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    println!("{line}");
                    seen += 1;
                }
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    client.close();
    Ok(())
}
