//! Suspendable audio context.
//!
//! [`ContextBuilder`] is where the graph is assembled: add nodes, connect them,
//! pick an output. [`ContextBuilder::launch`] then moves the graph onto a
//! dedicated render thread and returns an [`AudioContext`], which starts
//! suspended.
//!
//! While suspended the render thread pulls no blocks at all, so every node's
//! frame clock is frozen in place. Resuming continues from exactly that phase.

use core::marker::PhantomData;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::RenderClock;
use crate::graph::{AudioGraph, BLOCK_FRAMES};
use crate::node::{AudioNode, NodeId};

/// How long the render thread parks while suspended before re-checking.
const SUSPENDED_PARK: Duration = Duration::from_millis(5);

/// How long the render thread sleeps when the clock has nothing due.
const IDLE_SLEEP: Duration = Duration::from_micros(500);

/// A handle for sending messages to a node in the audio graph.
///
/// Returned when you add a node to a [`ContextBuilder`]. Use it to connect the
/// node and, after launch, to send it messages.
///
/// Messages are buffered in a lock-free ring buffer and processed at the start
/// of the next rendered block. If the buffer is full, [`Handle::send`] returns
/// `Err(msg)` with the message that couldn't be sent. Note that a suspended
/// context renders nothing, so messages queue up until it resumes.
pub struct Handle<M: Send + 'static> {
    pub(crate) node_id: NodeId,
    pub(crate) sender: rtrb::Producer<M>,
    pub(crate) _marker: PhantomData<M>,
}

impl<M: Send + 'static> Handle<M> {
    /// Send a message to the node.
    ///
    /// - `Ok(())` if the message was queued
    /// - `Err(msg)` if the queue is full (message dropped)
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    /// Free slots left in this node's message queue.
    pub fn capacity_left(&self) -> usize {
        self.sender.slots()
    }
}

/// State shared between an [`AudioContext`] and its render thread.
struct Shared {
    running: AtomicBool,
    shutdown: AtomicBool,
    blocks_rendered: AtomicU64,
    /// Set by the render thread for the duration of one block
    in_block: AtomicBool,
    /// Extra flag mirrored into the output device (see [`CpalSink`](crate::nodes::CpalSink))
    output_suspended: Option<Arc<AtomicBool>>,
}

/// Assembles an audio graph before it is handed to the render thread.
///
/// # Example
///
/// ```
/// use tactus::{ContextBuilder, ManualClock};
/// use tactus::nodes::{LoopPlayer, RtrbSink};
///
/// let (producer, _consumer) = rtrb::RingBuffer::<f32>::new(8192);
/// let mut builder = ContextBuilder::new(48_000).with_output(RtrbSink::mono(producer));
///
/// let (player, _monitor) = LoopPlayer::new();
/// let player = builder.add(player);
/// builder.output(&player);
///
/// let (clock, _driver) = ManualClock::new();
/// let context = builder.launch(clock).expect("render thread");
/// assert!(!context.is_running());
/// ```
pub struct ContextBuilder {
    graph: AudioGraph,
    sink_node: Option<NodeId>,
    output_suspended: Option<Arc<AtomicBool>>,
}

impl ContextBuilder {
    /// Start a graph at an explicit sample rate, without an output sink.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: AudioGraph::new(sample_rate),
            sink_node: None,
            output_suspended: None,
        }
    }

    /// Use `sink` as the graph's output (builder pattern).
    pub fn with_output<S: AudioNode<Message = ()>>(mut self, sink: S) -> Self {
        let handle = self.graph.add(sink);
        self.graph.set_terminal(handle.id());
        self.sink_node = Some(handle.id());
        self
    }

    /// Mirror suspend/resume into an output device's own gate.
    ///
    /// Devices that keep a queue of rendered audio use this to stop draining
    /// it while the context is suspended.
    pub fn with_output_gate(mut self, gate: Arc<AtomicBool>) -> Self {
        gate.store(true, Ordering::Release);
        self.output_suspended = Some(gate);
        self
    }

    /// Sample rate of the graph in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    /// Add a node to the graph.
    pub fn add<N: AudioNode>(&mut self, node: N) -> Handle<N::Message> {
        let handle = self.graph.add(node);
        Handle {
            node_id: handle.id(),
            sender: handle.sender,
            _marker: PhantomData,
        }
    }

    /// Connect two nodes: audio flows from `from` into `to`.
    pub fn connect<M1, M2>(&mut self, from: &Handle<M1>, to: &Handle<M2>)
    where
        M1: Send + 'static,
        M2: Send + 'static,
    {
        self.graph.connect(from.node_id, to.node_id);
    }

    /// Connect a node directly to the output sink.
    ///
    /// # Panics
    ///
    /// Panics if no output sink is configured.
    pub fn output<M: Send + 'static>(&mut self, handle: &Handle<M>) {
        let sink_id = self
            .sink_node
            .expect("No output sink configured. Use with_output().");
        self.graph.connect(handle.node_id, sink_id);
    }

    /// Move the graph onto its render thread. The context starts suspended.
    ///
    /// Fails only if the OS refuses to spawn the render thread.
    pub fn launch<C: RenderClock>(self, clock: C) -> io::Result<AudioContext> {
        let sample_rate = self.graph.sample_rate();
        if !self.graph.has_terminal() {
            debug!("launching audio context without an output sink");
        }

        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            blocks_rendered: AtomicU64::new(0),
            in_block: AtomicBool::new(false),
            output_suspended: self.output_suspended,
        });

        let thread_shared = shared.clone();
        let graph = self.graph;
        let render_thread = thread::Builder::new()
            .name("tactus-render".into())
            .spawn(move || render_loop(graph, clock, thread_shared))?;

        debug!(sample_rate, "audio context launched (suspended)");

        Ok(AudioContext {
            shared,
            sample_rate,
            render_thread: Some(render_thread),
        })
    }
}

fn render_loop<C: RenderClock>(mut graph: AudioGraph, mut clock: C, shared: Arc<Shared>) {
    let mut rendered = 0u64;
    let mut was_running = false;

    while !shared.shutdown.load(Ordering::Acquire) {
        if !shared.running.load(Ordering::Acquire) {
            was_running = false;
            thread::park_timeout(SUSPENDED_PARK);
            continue;
        }

        if !was_running {
            clock.on_resume(rendered);
            was_running = true;
        }

        let due = clock.blocks_due(rendered);
        if due == 0 {
            thread::sleep(IDLE_SLEEP);
            continue;
        }

        for done in 0..due {
            // Pairs with `AudioContext::suspend`: either we see the suspend
            // here, or suspend waits for this block to finish
            shared.in_block.store(true, Ordering::SeqCst);
            if !shared.running.load(Ordering::SeqCst) {
                clock.refund(due - done);
                shared.in_block.store(false, Ordering::SeqCst);
                break;
            }
            graph.process();
            rendered += 1;
            shared.blocks_rendered.store(rendered, Ordering::Release);
            shared.in_block.store(false, Ordering::SeqCst);
        }
    }

    trace!(rendered, "render thread exiting");
}

/// A running audio graph with a suspendable frame clock.
///
/// Created once per engine, suspended by default, resumed and suspended any
/// number of times, and shut down on drop.
pub struct AudioContext {
    shared: Arc<Shared>,
    sample_rate: u32,
    render_thread: Option<JoinHandle<()>>,
}

impl AudioContext {
    /// Start (or continue) rendering.
    pub fn resume(&self) {
        if !self.shared.running.swap(true, Ordering::AcqRel) {
            if let Some(gate) = &self.shared.output_suspended {
                gate.store(false, Ordering::Release);
            }
            if let Some(thread) = &self.render_thread {
                thread.thread().unpark();
            }
            debug!(frames = self.frames_rendered(), "audio context resumed");
        }
    }

    /// Stop rendering and freeze the frame clock where it is.
    ///
    /// Waits for a block already being rendered to finish, so no frame is
    /// rendered after this returns.
    pub fn suspend(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            self.wait_for_block();
            if let Some(gate) = &self.shared.output_suspended {
                gate.store(true, Ordering::Release);
            }
            debug!(frames = self.frames_rendered(), "audio context suspended");
        }
    }

    fn wait_for_block(&self) {
        while self.shared.in_block.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }

    /// `true` while the context is resumed.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Frames rendered since launch. Does not advance while suspended.
    pub fn frames_rendered(&self) -> u64 {
        self.shared.blocks_rendered.load(Ordering::Acquire) * BLOCK_FRAMES as u64
    }

    /// Seconds of audio rendered since launch (the context's clock).
    pub fn current_time(&self) -> f64 {
        self.frames_rendered() as f64 / self.sample_rate as f64
    }

    /// Sample rate of the graph in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(gate) = &self.shared.output_suspended {
            gate.store(true, Ordering::Release);
        }
        if let Some(thread) = self.render_thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}
