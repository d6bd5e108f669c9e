/// Options for a taint analysis run.
///
/// These replace any global debugging switches: every analysis receives its
/// own `Config`.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct Config {
    /// Log every instruction as it is processed
    pub debug_print_instructions: bool,

    /// Log every invoke instruction, along with the frame it sees
    pub debug_print_invocations: bool,

    /// Attach a short human-readable description to each `Taint` we create
    /// (shown by its `Display` impl)
    pub debug_taint_state: bool,

    /// How many times the fixpoint may revisit one location before we give up
    /// on the method as non-convergent
    pub max_visits_per_location: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_print_instructions: false,
            debug_print_invocations: false,
            debug_taint_state: false,
            max_visits_per_location: 1000,
        }
    }
}
