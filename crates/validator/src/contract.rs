//! Contract-presence and anchor detection.
//!
//! Detection is deliberately shallow: it proves that each operation name
//! appears in a definition-shaped spelling, not that the definition is
//! correct. The module is never executed.

use regex::Regex;

use playgate_core::types::Operation;

/// Host object that owns the anchor binding.
pub const ANCHOR_HOST: &str = "window";
/// Well-known top-level binding every module assigns its operations to.
pub const ANCHOR_BINDING: &str = "GAME";

/// Compiled detector for one contract operation.
#[derive(Debug)]
pub struct OperationRule {
    pub operation: Operation,
    spellings: Vec<(&'static str, Regex)>,
}

impl OperationRule {
    /// Build the spellings for one operation.
    ///
    /// Accepted forms, each optionally prefixed by `async`:
    /// - declaration: `function name(`
    /// - shorthand method: `name(args) {`
    /// - property function: `name: function`, `obj.name = function`
    /// - single-expression arrow: `name: (args) =>`, `name = arg =>`
    ///
    /// Object keys may be quoted and assignments may use bracket access.
    pub fn new(operation: Operation) -> Self {
        let name = regex::escape(operation.name());
        // Bare identifier not preceded by another identifier character, or
        // a quoted key (`"name":`, `['name'] =`).
        let key = format!(r#"(?:(?:^|[^\w$]){name}|["']{name}["']\s*\]?)"#);
        let bare = format!(r"(?:^|[^\w$.]){name}");
        let sep = r"(?::|=)";
        let arrow_params = r"(?:\([^()]*\)|[A-Za-z_$][\w$]*)";

        let spellings = vec![
            (
                "declaration",
                format!(r"(?:^|[^\w$.])(?:async\s+)?function\s*\*?\s*{name}\s*\("),
            ),
            (
                "shorthand_method",
                format!(r"{bare}\s*\([^()]*\)\s*\{{"),
            ),
            (
                "async_shorthand_method",
                format!(r"(?:^|[^\w$.])async\s+{name}\s*\([^()]*\)\s*\{{"),
            ),
            (
                "property_function",
                format!(r"{key}\s*{sep}\s*(?:async\s+)?function\b"),
            ),
            (
                "arrow_function",
                format!(r"{key}\s*{sep}\s*(?:async\s*)?{arrow_params}\s*=>"),
            ),
        ];

        Self {
            operation,
            spellings: spellings
                .into_iter()
                .map(|(label, pattern)| {
                    let regex = Regex::new(&format!("(?m){}", pattern))
                        .expect("contract patterns are built from escaped constants");
                    (label, regex)
                })
                .collect(),
        }
    }

    /// The first spelling that matches, if any.
    pub fn find_spelling(&self, stripped: &str) -> Option<&'static str> {
        self.spellings
            .iter()
            .find(|(_, regex)| regex.is_match(stripped))
            .map(|(label, _)| *label)
    }
}

/// Detector for the anchor assignment.
#[derive(Debug)]
pub struct AnchorRule {
    spellings: Vec<Regex>,
}

impl AnchorRule {
    /// Accepts `window.GAME =`, `window["GAME"] =` and `window['GAME'] =`.
    /// Comparisons (`==`, `===`) do not count.
    pub fn new() -> Self {
        let host = regex::escape(ANCHOR_HOST);
        let binding = regex::escape(ANCHOR_BINDING);
        let assign = r"\s*=(?:[^=]|$)";
        let patterns = [
            format!(r"(?:^|[^\w$.]){host}\s*\.\s*{binding}{assign}"),
            format!(r#"(?:^|[^\w$.]){host}\s*\[\s*"{binding}"\s*\]{assign}"#),
            format!(r"(?:^|[^\w$.]){host}\s*\[\s*'{binding}'\s*\]{assign}"),
        ];
        Self {
            spellings: patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("(?m){}", p))
                        .expect("anchor patterns are built from escaped constants")
                })
                .collect(),
        }
    }

    pub fn is_present(&self, stripped: &str) -> bool {
        self.spellings.iter().any(|r| r.is_match(stripped))
    }
}

impl Default for AnchorRule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detects(op: Operation, src: &str) -> bool {
        OperationRule::new(op).find_spelling(src).is_some()
    }

    #[test]
    fn test_declaration_spellings() {
        assert!(detects(Operation::Init, "function init() {}"));
        assert!(detects(Operation::Init, "async function init() {}"));
        assert!(!detects(Operation::Init, "function initialize() {}"));
    }

    #[test]
    fn test_shorthand_method_spellings() {
        assert!(detects(Operation::ReadState, "{ readState() { return s; } }"));
        assert!(detects(Operation::Start, "{ async start() { await x; } }"));
        assert!(detects(Operation::DispatchInput, "{\n  dispatchInput(action) {\n"));
        // A call is not a definition.
        assert!(!detects(Operation::Start, "GAME.start();"));
        assert!(!detects(Operation::Start, "if (ready) restart() {"));
    }

    #[test]
    fn test_property_function_spellings() {
        assert!(detects(Operation::Reset, "reset: function() {}"));
        assert!(detects(Operation::Reset, "GAME.reset = async function () {}"));
        assert!(detects(Operation::Reset, "window['GAME']['reset'] = function() {}"));
        assert!(detects(Operation::Reset, "{ \"reset\": function() {} }"));
    }

    #[test]
    fn test_arrow_spellings() {
        assert!(detects(Operation::ReadMeta, "readMeta: () => ({ name: 'x' })"));
        assert!(detects(Operation::DispatchInput, "dispatchInput: a => handle(a)"));
        assert!(detects(Operation::Init, "GAME.init = async () => boot()"));
        assert!(!detects(Operation::Init, "const x = init => 1;"));
    }

    #[test]
    fn test_anchor_spellings() {
        let anchor = AnchorRule::new();
        assert!(anchor.is_present("window.GAME = {"));
        assert!(anchor.is_present("window [ \"GAME\" ] = game;"));
        assert!(anchor.is_present("window['GAME']=game;"));
        assert!(!anchor.is_present("if (window.GAME === undefined) {}"));
        assert!(!anchor.is_present("window.GAMES = {}"));
        assert!(!anchor.is_present("const GAME = {}"));
    }
}
