//! Update behaviour flags

use bitflags::bitflags;

bitflags! {
    /// Side effects an explicit update opts into
    ///
    /// The initial assignment made while a value initialises never uses these;
    /// it sets the value silently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateFlags: u8 {
        /// Replace the current value
        const SET_VALUE = 1 << 0;
        /// Fan the new value out to the key's controllers
        const NOTIFY_CONTEXT = 1 << 1;
        /// Re-run the query
        const RELOAD_DATA = 1 << 2;
        /// Write the new value to persistence
        const PERSIST_VALUE = 1 << 3;
    }
}

impl Default for UpdateFlags {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_everything() {
        let flags = UpdateFlags::default();
        assert!(flags.contains(UpdateFlags::SET_VALUE));
        assert!(flags.contains(UpdateFlags::NOTIFY_CONTEXT));
        assert!(flags.contains(UpdateFlags::RELOAD_DATA));
        assert!(flags.contains(UpdateFlags::PERSIST_VALUE));
    }

    #[test]
    fn test_flags_combine() {
        let flags = UpdateFlags::SET_VALUE | UpdateFlags::NOTIFY_CONTEXT;
        assert!(!flags.contains(UpdateFlags::RELOAD_DATA));
        assert_eq!(flags - UpdateFlags::NOTIFY_CONTEXT, UpdateFlags::SET_VALUE);
    }
}
