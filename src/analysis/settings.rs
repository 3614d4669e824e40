/// Knobs for a program analysis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Seed the reachable types with the runtime `Type` type
    ///
    /// Code generation materializes type objects for every reachable type, so it needs the type
    /// of those objects even when no instruction mentions it.
    pub include_runtime_type: bool,

    /// Keep the per-instruction stack snapshots in each method analysis
    ///
    /// The emitter only needs the source/sink and discontinuity maps, so snapshots can be
    /// dropped to save memory on large programs.
    pub retain_stack_snapshots: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            include_runtime_type: true,
            retain_stack_snapshots: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
