//! IO-bound thread pool.
//!
//! The graph owns one pool and hands a shared handle to every block at init
//! time. Blocks whose work may stall on IO or system calls run their
//! blocking parts here instead of occupying a compute worker.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct IoThreadPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl IoThreadPool {
    pub fn new(name: impl Into<String>, num_threads: usize) -> Arc<Self> {
        let name = name.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..num_threads.max(1))
            .map(|i| {
                let receiver: Receiver<Job> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("failed to spawn io worker thread")
            })
            .collect();
        Arc::new(Self {
            name,
            sender: Some(sender),
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a job. Jobs run in submission order per worker but with no
    /// ordering guarantee across workers.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            // receivers only disappear at drop, so this cannot fail here
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for IoThreadPool {
    fn drop(&mut self) {
        // closing the channel lets every worker drain and exit
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for IoThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoThreadPool")
            .field("name", &self.name)
            .field("num_threads", &self.workers.len())
            .finish()
    }
}
