use std::{
    fmt,
    io::{self, Write},
    process,
};

use argh::FromArgs;
use dataview::PodMethods as _;
use region_heap::{Heap, HeapConfig, HeapPtr, config::DEFAULT_MIN_BLOCK_SIZE};
use snafu::{Report, ResultExt as _, Whatever, whatever};

use self::op::Op;

mod logger;
mod op;

const DEFAULT_REGION_SIZE: usize = 1024;

/// Replay heap operations over simulated memory regions.
///
/// Operations: alloc=SIZE, zalloc=COUNT,SIZE, free=ID, resize=ID,SIZE, dump,
/// stats. Each successful allocation gets the next ID, starting at 0.
#[derive(Debug, FromArgs)]
struct Args {
    /// size in bytes of a region to donate; repeat for more regions
    /// (default: one region of 1024 bytes)
    #[argh(option)]
    region: Vec<usize>,
    /// smallest remainder split off as a free block
    #[argh(option, default = "DEFAULT_MIN_BLOCK_SIZE")]
    min_block_size: usize,
    /// zero every payload handed out
    #[argh(switch)]
    zero_fill: bool,
    /// log every heap operation to stderr
    #[argh(switch, short = 'v')]
    verbose: bool,
    /// operations to run, in order
    #[argh(positional)]
    ops: Vec<Op>,
}

fn main() {
    let args: Args = argh::from_env();

    if let Err(err) = logger::init(args.verbose) {
        eprintln!("failed to install logger: {err}");
    }

    if let Err(err) = run(&args) {
        let report = Report::from_error(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Whatever> {
    let config = HeapConfig::new()
        .with_min_block_size(args.min_block_size)
        .whatever_context("invalid --min-block-size")?
        .with_zero_fill(args.zero_fill);

    let sizes = if args.region.is_empty() {
        vec![DEFAULT_REGION_SIZE]
    } else {
        args.region.clone()
    };
    // u64 storage keeps every region base aligned.
    let mut buffers = sizes
        .iter()
        .map(|size| vec![0_u64; size.div_ceil(8)])
        .collect::<Vec<_>>();

    let mut sim = Simulator::new(config);
    sim.heap
        .assign(
            buffers
                .iter_mut()
                .zip(&sizes)
                .map(|(buffer, &size)| &mut buffer.as_bytes_mut()[..size]),
        )
        .whatever_context("failed to assign regions")?;

    let default_ops = [Op::Dump];
    let ops = if args.ops.is_empty() {
        &default_ops[..]
    } else {
        &args.ops
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for op in ops {
        sim.apply(*op, &mut out)?;
    }
    Ok(())
}

struct Simulator<'a> {
    heap: Heap<'a>,
    /// Live handles by ID; released blocks leave `None` behind.
    slots: Vec<Option<HeapPtr>>,
}

impl Simulator<'_> {
    fn new(config: HeapConfig) -> Self {
        Self {
            heap: Heap::with_config(config),
            slots: Vec::new(),
        }
    }

    /// Runs one operation and prints its outcome.
    ///
    /// Heap failures are printed and the simulation goes on; unknown IDs and
    /// write errors abort it.
    fn apply<W>(&mut self, op: Op, out: &mut W) -> Result<(), Whatever>
    where
        W: Write,
    {
        self.apply_inner(op, out)
            .whatever_context("failed to write output")?
    }

    fn apply_inner<W>(&mut self, op: Op, out: &mut W) -> io::Result<Result<(), Whatever>>
    where
        W: Write,
    {
        match op {
            Op::Alloc(size) => {
                let result = self.heap.allocate(size);
                self.record(out, &format!("alloc({size})"), result)?;
            }
            Op::AllocZeroed(count, size) => {
                let result = self.heap.allocate_zeroed(count, size);
                self.record(out, &format!("zalloc({count}, {size})"), result)?;
            }
            Op::Free(id) => {
                let Some(slot) = self.slots.get_mut(id) else {
                    return Ok(unknown_id(id));
                };
                match self.heap.release_and_null(slot) {
                    Ok(()) => writeln!(out, "free(#{id})")?,
                    Err(err) => writeln!(out, "free(#{id}) failed: {err}")?,
                }
            }
            Op::Resize(id, size) => {
                let Some(slot) = self.slots.get_mut(id) else {
                    return Ok(unknown_id(id));
                };
                let result = self.heap.resize_slot(slot, size).map(|()| *slot);
                match result {
                    Ok(current) => match current {
                        Some(ptr) => writeln!(
                            out,
                            "resize(#{id}, {size}) -> {ptr} ({} byte payload)",
                            self.payload_size(ptr)
                        )?,
                        None => writeln!(out, "resize(#{id}, {size}) -> released")?,
                    },
                    Err(err) => writeln!(out, "resize(#{id}, {size}) failed: {err}")?,
                }
            }
            Op::Dump => writeln!(out, "{}", self.heap.debug_report())?,
            Op::Stats => {
                let stats = self.heap.stats();
                writeln!(
                    out,
                    "regions: {}, total: {}, used: {}, free: {}, min free: {}, allocs: {}, \
                     releases: {}",
                    stats.region_count,
                    stats.total_bytes,
                    stats.used_bytes(),
                    stats.available_bytes,
                    stats.min_ever_available_bytes,
                    stats.alloc_count,
                    stats.release_count,
                )?;
            }
        }
        Ok(Ok(()))
    }

    fn record<W, E>(
        &mut self,
        out: &mut W,
        call: &str,
        result: Result<HeapPtr, E>,
    ) -> io::Result<()>
    where
        W: Write,
        E: fmt::Display,
    {
        match result {
            Ok(ptr) => {
                let id = self.slots.len();
                self.slots.push(Some(ptr));
                writeln!(
                    out,
                    "#{id} = {call} -> {ptr} ({} byte payload)",
                    self.payload_size(ptr)
                )
            }
            Err(err) => writeln!(out, "{call} failed: {err}"),
        }
    }

    fn payload_size(&self, ptr: HeapPtr) -> usize {
        self.heap.payload_size(ptr).unwrap_or_default()
    }
}

fn unknown_id(id: usize) -> Result<(), Whatever> {
    whatever!("no allocation with ID #{id}")
}
