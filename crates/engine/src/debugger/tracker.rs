// SDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Detection of line entries and function entries from raw line callbacks.

/// Where the runtime was at the previous line callback.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinePoint {
    section: String,
    line: u32,
    depth: usize,
    function: String,
}

/// What changed between two consecutive line callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LineEvent {
    /// The runtime moved to a different line, or the same line in another frame.
    pub(crate) new_line: bool,
    /// The runtime entered a function.
    pub(crate) function_entry: bool,
}

/// Turns the stream of per-instruction callbacks into line and function-entry events, so
/// a breakpoint fires once when its line is reached instead of once per instruction.
#[derive(Debug, Default)]
pub(crate) struct LineTracker {
    last: Option<LinePoint>,
}

impl LineTracker {
    pub(crate) fn observe(
        &mut self,
        section: &str,
        line: u32,
        depth: usize,
        function: &str,
    ) -> LineEvent {
        let event = match &self.last {
            None => LineEvent { new_line: true, function_entry: true },
            Some(last) => LineEvent {
                new_line: last.depth != depth || last.line != line || last.section != section,
                function_entry: depth > last.depth
                    || (depth == last.depth && last.function != function),
            },
        };

        self.last =
            Some(LinePoint {
                section: section.to_string(),
                line,
                depth,
                function: function.to_string(),
            });
        event
    }

    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_instructions_on_one_line() {
        let mut tracker = LineTracker::default();
        assert!(tracker.observe("a.as", 3, 1, "main").new_line);
        assert!(!tracker.observe("a.as", 3, 1, "main").new_line);
        assert!(tracker.observe("a.as", 4, 1, "main").new_line);
        assert!(tracker.observe("a.as", 3, 1, "main").new_line);
    }

    #[test]
    fn test_function_entry() {
        let mut tracker = LineTracker::default();
        assert!(tracker.observe("a.as", 1, 1, "main").function_entry);
        assert!(!tracker.observe("a.as", 2, 1, "main").function_entry);

        let event = tracker.observe("b.as", 10, 2, "update");
        assert!(event.function_entry);
        assert!(event.new_line);

        assert!(!tracker.observe("a.as", 2, 1, "main").function_entry);
        assert!(tracker.observe("b.as", 10, 1, "update").function_entry);
    }

    #[test]
    fn test_recursion_is_a_new_line() {
        let mut tracker = LineTracker::default();
        tracker.observe("a.as", 7, 1, "fib");
        let event = tracker.observe("a.as", 7, 2, "fib");
        assert!(event.new_line);
        assert!(event.function_entry);
    }

    #[test]
    fn test_reset() {
        let mut tracker = LineTracker::default();
        tracker.observe("a.as", 3, 1, "main");
        tracker.reset();
        assert_eq!(
            tracker.observe("a.as", 3, 1, "main"),
            LineEvent { new_line: true, function_entry: true }
        );
    }
}
