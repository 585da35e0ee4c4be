use clap::Args;

/// CLI-facing mirror of [`suo_runtime::Config`], parsed by `clap` and
/// converted once at startup — library crates stay ignorant of the CLI
/// layer, matching the teacher's split between `fuel-vm::consts` defaults
/// and a caller-supplied config struct.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Word capacity of a single semi-space.
    #[arg(long, default_value_t = suo_runtime::DEFAULT_HEAP_WORDS)]
    pub heap_words: usize,
    /// Capacity of the root stack.
    #[arg(long, default_value_t = suo_runtime::DEFAULT_ROOT_STACK_CAPACITY)]
    pub root_stack_capacity: usize,
    /// Force a GC before every allocation (slow; for GC-bug hunting).
    #[arg(long)]
    pub gc_before_every_allocation: bool,
    /// Run the heap consistency check around every collection.
    #[arg(long)]
    pub debug_heap_check: bool,
}

impl From<Config> for suo_runtime::Config {
    fn from(c: Config) -> Self {
        suo_runtime::Config {
            heap_words: c.heap_words,
            root_stack_capacity: c.root_stack_capacity,
            gc_before_every_allocation: c.gc_before_every_allocation,
            debug_heap_check: c.debug_heap_check || suo_runtime::Config::default().debug_heap_check,
        }
    }
}
