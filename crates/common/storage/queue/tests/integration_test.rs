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

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use kvqueue_common_telemetry::init_default_ut_logging;
use kvqueue_queue::{
    Consumer, CoordinationStore, HandlerResult, MemoryStore, MutationQueue, Queue, QueueError,
    RecordHandler,
};

#[derive(Debug, Default)]
struct Signer {
    applied: Vec<(String, String)>,
    epoch:   u64,
    /// Number of mutations applied in each closed epoch.
    closed:  Vec<usize>,
    open:    usize,
}

#[async_trait]
impl RecordHandler for Signer {
    async fn process_key_value(&mut self, key: Bytes, value: Bytes) -> HandlerResult {
        let key = String::from_utf8(key.to_vec())?;
        let value = String::from_utf8(value.to_vec())?;
        self.applied.push((key, value));
        self.open += 1;
        Ok(())
    }

    async fn advance_epoch(&mut self) -> HandlerResult {
        self.epoch += 1;
        self.closed.push(self.open);
        self.open = 0;
        Ok(())
    }
}

#[tokio::test]
async fn test_single_writer_round_trip() {
    init_default_ut_logging();

    let queue = Queue::new(Arc::new(MemoryStore::new()), "map-1");
    for i in 0..10 {
        queue
            .enqueue(format!("index-{i:02}"), format!("leaf-{i}"))
            .await
            .unwrap();
    }
    queue.advance_epoch().await.unwrap();

    let mut signer = Signer::default();
    for _ in 0..11 {
        queue.dequeue(&mut signer).await.unwrap();
    }

    assert_eq!(signer.applied.len(), 10);
    for (i, (key, value)) in signer.applied.iter().enumerate() {
        assert_eq!(key, &format!("index-{i:02}"));
        assert_eq!(value, &format!("leaf-{i}"));
    }
    assert_eq!(signer.closed, vec![10]);
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_writers_single_reader() {
    init_default_ut_logging();

    const WRITERS: usize = 8;
    const PER_WRITER: usize = 50;

    let store = Arc::new(MemoryStore::new());
    let queue = Queue::new(store, "map-2");

    let handle = Consumer::new(queue.clone()).spawn(Signer::default());

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let queue = queue.clone();
            tokio::spawn(async move {
                for i in 0..PER_WRITER {
                    queue
                        .enqueue(format!("w{w}"), format!("{i}"))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    while !queue.is_empty().await.unwrap() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (signer, stats) = handle.shutdown().await.unwrap();
    assert_eq!(stats.mutations, (WRITERS * PER_WRITER) as u64);
    assert_eq!(signer.applied.len(), WRITERS * PER_WRITER);

    // Each writer's own records arrive in the order it wrote them.
    let mut next: HashMap<String, usize> = HashMap::new();
    for (writer, seq) in &signer.applied {
        let expected = next.entry(writer.clone()).or_default();
        assert_eq!(seq.parse::<usize>().unwrap(), *expected, "writer {writer}");
        *expected += 1;
    }
}

#[tokio::test]
async fn test_epoch_markers_split_mutations() {
    init_default_ut_logging();

    let queue: Arc<dyn MutationQueue> = Arc::new(Queue::new(Arc::new(MemoryStore::new()), "map-3"));
    for batch in [3, 0, 2] {
        for i in 0..batch {
            queue
                .enqueue(Bytes::from(format!("k{i}")), Bytes::from("v"))
                .await
                .unwrap();
        }
        queue.advance_epoch().await.unwrap();
    }

    let mut signer = Signer::default();
    for _ in 0..8 {
        queue.dequeue(&mut signer).await.unwrap();
    }
    assert_eq!(signer.epoch, 3);
    assert_eq!(signer.closed, vec![3, 0, 2]);
}

#[tokio::test]
async fn test_queues_on_shared_store_are_independent() {
    init_default_ut_logging();

    let store = Arc::new(MemoryStore::new());
    let a = Queue::new(store.clone(), "map-a");
    let b = Queue::new(store.clone(), "map-b");

    a.enqueue("only-a", "1").await.unwrap();
    b.enqueue("only-b", "2").await.unwrap();

    let mut signer = Signer::default();
    b.dequeue(&mut signer).await.unwrap();
    assert_eq!(signer.applied, vec![("only-b".to_string(), "2".to_string())]);
    assert_eq!(store.len("map-a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_non_utf8_key_reported_as_handler_error() {
    init_default_ut_logging();

    let queue = Queue::new(Arc::new(MemoryStore::new()), "map-4");
    queue
        .enqueue(Bytes::from_static(&[0xc3, 0x28]), "v")
        .await
        .unwrap();

    let err = queue.dequeue(&mut Signer::default()).await.unwrap_err();
    assert!(matches!(err, QueueError::Handler { .. }));
}
