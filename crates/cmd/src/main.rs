// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use kvqueue_common_telemetry::{LogFormat, LoggingOptions, init_global_logging, set_panic_hook};
use kvqueue_queue::{
    Consumer, HandlerResult, MemoryStore, MutationQueue, Queue, QueueError, RecordHandler,
};
use snafu::{ResultExt, Whatever, ensure_whatever};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "kvqueue",
about= "kvqueue-cmd",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Version(VersionArgs),
    Demo(DemoArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the build version.
Examples:

kvqueue version

")]
struct VersionArgs {}

impl VersionArgs {
    #[allow(clippy::unused_self)]
    fn run(&self) -> Result<(), Whatever> {
        println!("kvqueue {}", build_info::FULL_VERSION);
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Run concurrent writers and a single reader against an in-process store.
Examples:

kvqueue demo --writers 4 --mutations 100 --epoch-every 20

")]
struct DemoArgs {
    /// Map id, used as the queue's key prefix.
    #[arg(long, default_value = "demo")]
    map_id:      String,
    #[arg(long, default_value_t = 4)]
    writers:     usize,
    /// Mutations enqueued by each writer.
    #[arg(long, default_value_t = 25)]
    mutations:   usize,
    /// Each writer submits an epoch marker after this many mutations. 0
    /// disables markers.
    #[arg(long, default_value_t = 10)]
    epoch_every: usize,
    /// Log filter, e.g. `debug` or `info,kvqueue_queue=debug`.
    #[arg(long)]
    log_level:   Option<String>,
    #[arg(long)]
    json_logs:   bool,
}

impl DemoArgs {
    fn expected_records(&self) -> u64 {
        let epochs = self.mutations.checked_div(self.epoch_every).unwrap_or(0);
        ((self.mutations + epochs) * self.writers) as u64
    }

    async fn run(&self) -> Result<(), Whatever> {
        ensure_whatever!(self.writers > 0, "--writers must be at least 1");

        let logging = LoggingOptions::builder()
            .maybe_level(self.log_level.clone())
            .log_format(if self.json_logs {
                LogFormat::Json
            } else {
                LogFormat::Text
            })
            .build();
        let _guards = init_global_logging("kvqueue", &logging);
        set_panic_hook();

        let store = Arc::new(MemoryStore::new());
        let queue = Queue::builder(store.clone(), self.map_id.clone())
            .build()
            .whatever_context("invalid queue configuration")?;

        let expected = self.expected_records();
        let done = CancellationToken::new();
        let signer = DemoSigner {
            expected,
            done: done.clone(),
            ..Default::default()
        };
        let consumer = Consumer::with_cancellation(queue.clone(), done.clone()).spawn(signer);
        if expected == 0 {
            done.cancel();
        }

        let producer: Arc<dyn MutationQueue> = Arc::new(queue);
        let writers: Vec<_> = (0..self.writers)
            .map(|writer| {
                let producer = producer.clone();
                let mutations = self.mutations;
                let epoch_every = self.epoch_every;
                tokio::spawn(async move {
                    write_batch(producer.as_ref(), writer, mutations, epoch_every).await
                })
            })
            .collect();

        for writer in writers {
            writer
                .await
                .whatever_context("writer task failed")?
                .whatever_context("writer could not enqueue")?;
        }
        info!(writers = self.writers, expected, "all writers finished");

        let (signer, stats) = consumer.join().await.whatever_context("consumer failed")?;
        store.close();

        println!(
            "dequeued {} mutations and {} epoch markers from {} writers; final epoch {}",
            stats.mutations, stats.epochs, self.writers, signer.epoch
        );
        Ok(())
    }
}

async fn write_batch(
    producer: &dyn MutationQueue,
    writer: usize,
    mutations: usize,
    epoch_every: usize,
) -> Result<(), QueueError> {
    for i in 0..mutations {
        producer
            .enqueue(
                Bytes::from(format!("w{writer}/key-{i}")),
                Bytes::from(format!("value-{i}")),
            )
            .await?;
        if epoch_every > 0 && (i + 1) % epoch_every == 0 {
            producer.advance_epoch().await?;
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct DemoSigner {
    expected:      u64,
    seen:          u64,
    epoch:         u64,
    epoch_applied: u64,
    done:          CancellationToken,
}

impl DemoSigner {
    fn observe(&mut self) {
        self.seen += 1;
        if self.seen >= self.expected {
            self.done.cancel();
        }
    }
}

#[async_trait]
impl RecordHandler for DemoSigner {
    async fn process_key_value(&mut self, key: Bytes, value: Bytes) -> HandlerResult {
        tracing::debug!(
            key = %String::from_utf8_lossy(&key),
            value_len = value.len(),
            "applied mutation"
        );
        self.epoch_applied += 1;
        self.observe();
        Ok(())
    }

    async fn advance_epoch(&mut self) -> HandlerResult {
        self.epoch += 1;
        info!(
            epoch = self.epoch,
            mutations = self.epoch_applied,
            "epoch advanced"
        );
        self.epoch_applied = 0;
        self.observe();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Version(va) => va.run(),
        Commands::Demo(da) => da.run().await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() { Cli::command().debug_assert(); }

    #[test]
    fn test_expected_records() {
        let cli = Cli::parse_from([
            "kvqueue",
            "demo",
            "--writers",
            "3",
            "--mutations",
            "25",
            "--epoch-every",
            "10",
        ]);
        let Commands::Demo(args) = cli.commands else {
            panic!("expected demo");
        };
        // 25 mutations and 2 markers per writer.
        assert_eq!(args.expected_records(), 81);
    }

    #[test]
    fn test_expected_records_without_markers() {
        let cli = Cli::parse_from(["kvqueue", "demo", "--mutations", "7", "--epoch-every", "0"]);
        let Commands::Demo(args) = cli.commands else {
            panic!("expected demo");
        };
        assert_eq!(args.expected_records(), 28);
    }

    #[tokio::test]
    async fn test_signer_cancels_after_expected() {
        let done = CancellationToken::new();
        let mut signer = DemoSigner {
            expected: 2,
            done: done.clone(),
            ..Default::default()
        };

        signer
            .process_key_value(Bytes::from("k"), Bytes::from("v"))
            .await
            .unwrap();
        assert!(!done.is_cancelled());
        signer.advance_epoch().await.unwrap();
        assert!(done.is_cancelled());
        assert_eq!(signer.epoch, 1);
    }
}
