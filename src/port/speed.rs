//! Mapping between numeric baud rates and native speed codes.

/// An immutable table of `(baud rate, native code)` pairs.
///
/// Tables are small and only consulted when a configuration is applied or
/// queried, so lookups are plain linear scans. Entries must be unique in both
/// columns.
#[derive(Debug)]
pub struct SpeedTable<C: 'static> {
    entries: &'static [(u32, C)],
}

impl<C: Copy + PartialEq> SpeedTable<C> {
    /// Wrap a static list of entries.
    pub const fn new(entries: &'static [(u32, C)]) -> Self {
        Self { entries }
    }

    /// Native code for `speed`, or `None` if the rate is unsupported.
    pub fn code_for(&self, speed: u32) -> Option<C> {
        self.entries
            .iter()
            .find(|(s, _)| *s == speed)
            .map(|(_, code)| *code)
    }

    /// Baud rate for `code`, or `None` if the code is not a standard rate.
    pub fn speed_for(&self, code: C) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(speed, _)| *speed)
    }

    /// All supported rates, in table order.
    pub fn speeds(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(speed, _)| *speed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
