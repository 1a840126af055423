//! Parallel Chunk Encoding
//!
//! Chunk encoding (transposition + compression) dominates write cost, so
//! the record writer can farm it out to worker threads. The ordering
//! contract is strict: chunks appear in the file in submission order, and
//! flushing blocks until everything submitted has been written.
//!
//! ## Shape
//!
//! An ordered promise queue:
//!
//! - each submitted batch gets a single-use result channel (its promise);
//! - the promise receivers are queued to a single **drainer** thread in
//!   submission order, interleaved with padding and flush commands;
//! - **workers** pull batches from a shared job channel, encode, and
//!   fulfill the promise;
//! - the drainer owns the [`ChunkWriter`] and blocks on one promise at a
//!   time, so the file is written strictly in submission order no matter
//!   how encoding completes.
//!
//! The first error (worker or writer) poisons the pool; it is reported
//! at the next flush and the pool writes nothing further.

use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;
use riegeli_core::{Error, Result, Writer};
use riegeli_chunk::{Chunk, ChunkEncoder};

use crate::chunk_writer::ChunkWriter;

type Promise = channel::Receiver<Result<Chunk>>;

enum DrainItem {
    /// Wait for this chunk and write it.
    Chunk(Promise),
    /// Pad the file to a block boundary.
    Pad,
    /// Drain everything before this point, flush, and acknowledge.
    Flush(channel::Sender<Result<()>>),
}

/// Worker pool plus ordered drainer around a [`ChunkWriter`].
pub(crate) struct EncodePool<W: Writer + Send + 'static> {
    job_tx: Option<channel::Sender<(ChunkEncoder, channel::Sender<Result<Chunk>>)>>,
    drain_tx: Option<channel::Sender<DrainItem>>,
    workers: Vec<JoinHandle<()>>,
    drainer: Option<JoinHandle<ChunkWriter<W>>>,
}

impl<W: Writer + Send + 'static> EncodePool<W> {
    pub fn start(writer: ChunkWriter<W>, parallelism: u32) -> Result<Self> {
        let parallelism = parallelism.max(1) as usize;
        let (job_tx, job_rx) =
            channel::bounded::<(ChunkEncoder, channel::Sender<Result<Chunk>>)>(parallelism * 2);
        let (drain_tx, drain_rx) = channel::unbounded::<DrainItem>();

        let mut workers = Vec::with_capacity(parallelism);
        for index in 0..parallelism {
            let job_rx = job_rx.clone();
            let worker = thread::Builder::new()
                .name(format!("riegeli-encode-{index}"))
                .spawn(move || {
                    for (encoder, promise_tx) in job_rx.iter() {
                        let _ = promise_tx.send(encoder.encode());
                    }
                })?;
            workers.push(worker);
        }

        let drainer = thread::Builder::new()
            .name("riegeli-drain".to_owned())
            .spawn(move || {
                let mut writer = writer;
                let mut failed: Option<Error> = None;
                for item in drain_rx.iter() {
                    match item {
                        DrainItem::Chunk(promise) => {
                            let outcome = match promise.recv() {
                                Ok(result) => result,
                                Err(_) => Err(Error::internal("encode worker disappeared")),
                            };
                            if failed.is_some() {
                                continue;
                            }
                            match outcome.and_then(|chunk| writer.write_chunk(&chunk)) {
                                Ok(()) => {}
                                Err(e) => {
                                    tracing::warn!(error = %e, "parallel chunk write failed");
                                    failed = Some(e);
                                }
                            }
                        }
                        DrainItem::Pad => {
                            if failed.is_none() {
                                if let Err(e) = writer.pad_to_block_boundary() {
                                    failed = Some(e);
                                }
                            }
                        }
                        DrainItem::Flush(ack) => {
                            let outcome = match failed.take() {
                                Some(e) => {
                                    // Later flushes keep failing.
                                    failed = Some(Error::internal(
                                        "record writer already failed",
                                    ));
                                    Err(e)
                                }
                                None => writer.flush(),
                            };
                            let _ = ack.send(outcome);
                        }
                    }
                }
                writer
            })?;

        Ok(Self {
            job_tx: Some(job_tx),
            drain_tx: Some(drain_tx),
            workers,
            drainer: Some(drainer),
        })
    }

    /// Queues one batch; its chunk will be written after everything
    /// submitted earlier.
    pub fn submit(&self, encoder: ChunkEncoder) -> Result<()> {
        let (promise_tx, promise_rx) = channel::bounded(1);
        self.drain(DrainItem::Chunk(promise_rx))?;
        self.job_tx
            .as_ref()
            .and_then(|tx| tx.send((encoder, promise_tx)).ok())
            .ok_or_else(|| Error::internal("encode pool is shut down"))?;
        Ok(())
    }

    /// Queues a pad-to-block-boundary after everything submitted so far.
    pub fn pad_to_block_boundary(&self) -> Result<()> {
        self.drain(DrainItem::Pad)
    }

    /// Blocks until all earlier submissions are written and flushed.
    pub fn sync(&self) -> Result<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.drain(DrainItem::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| Error::internal("drain thread disappeared"))?
    }

    /// Drains, joins all threads, and hands the writer back.
    pub fn shutdown(mut self) -> Result<ChunkWriter<W>> {
        self.job_tx = None;
        self.drain_tx = None;
        for worker in self.workers.drain(..) {
            worker
                .join()
                .map_err(|_| Error::internal("encode worker panicked"))?;
        }
        self.drainer
            .take()
            .ok_or_else(|| Error::internal("drain thread already taken"))?
            .join()
            .map_err(|_| Error::internal("drain thread panicked"))
    }

    fn drain(&self, item: DrainItem) -> Result<()> {
        self.drain_tx
            .as_ref()
            .and_then(|tx| tx.send(item).ok())
            .ok_or_else(|| Error::internal("encode pool is shut down"))
    }
}

impl<W: Writer + Send + 'static> Drop for EncodePool<W> {
    fn drop(&mut self) {
        // Closing the channels lets the threads run down on their own;
        // abandoned handles detach rather than block the caller.
        self.job_tx = None;
        self.drain_tx = None;
    }
}
