use bitflags::bitflags;

bitflags! {
    /// Markers on methods
    pub struct MethodFlags: u16 {
        /// No receiver is passed to the method
        const STATIC = 0x0001;

        /// Instance constructor (invoked through `newobj`)
        const CONSTRUCTOR = 0x0002;

        /// Static constructor of the declaring type (runs before first static field access)
        const TYPE_INITIALIZER = 0x0004;

        const VIRTUAL = 0x0008;

        /// Must be inlined at every call site
        const ALWAYS_INLINE = 0x0100;

        /// Synthesized by the front end (body is not analyzed)
        const COMPILER_GENERATED = 0x0200;
    }
}

bitflags! {
    /// Markers on fields
    pub struct FieldFlags: u16 {
        const STATIC = 0x0001;
        const READ_ONLY = 0x0002;
        const COMPILER_GENERATED = 0x0200;
    }
}

impl Default for MethodFlags {
    fn default() -> MethodFlags {
        MethodFlags::empty()
    }
}

impl Default for FieldFlags {
    fn default() -> FieldFlags {
        FieldFlags::empty()
    }
}
