//! The fixed table of host primitives exposed to evaluated component code.
//!
//! The table is static: there is no API to add a name at runtime, so the
//! exposed set can never grow based on untrusted input. Evaluated code that
//! reads any other free name fails with a `ReferenceError`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Namespace object bundling every other capability (`React`).
    Namespace,
    /// UI-tree constructor or fragment marker.
    TreeConstructor,
    State,
    Effect,
    Ref,
    MemoizedCallback,
    Memo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub name: &'static str,
    pub kind: CapabilityKind,
}

const STANDARD: &[Capability] = &[
    Capability { name: "React", kind: CapabilityKind::Namespace },
    Capability { name: "createElement", kind: CapabilityKind::TreeConstructor },
    Capability { name: "h", kind: CapabilityKind::TreeConstructor },
    Capability { name: "Fragment", kind: CapabilityKind::TreeConstructor },
    Capability { name: "useState", kind: CapabilityKind::State },
    Capability { name: "useReducer", kind: CapabilityKind::State },
    Capability { name: "useEffect", kind: CapabilityKind::Effect },
    Capability { name: "useLayoutEffect", kind: CapabilityKind::Effect },
    Capability { name: "useRef", kind: CapabilityKind::Ref },
    Capability { name: "useCallback", kind: CapabilityKind::MemoizedCallback },
    Capability { name: "useMemo", kind: CapabilityKind::Memo },
];

/// Language built-ins evaluated code may read. Host objects (`Deno`,
/// `globalThis`, `fetch`, timers, storage) are deliberately absent.
const INTRINSICS: &[&str] = &[
    "undefined",
    "NaN",
    "Infinity",
    "Object",
    "Array",
    "String",
    "Number",
    "Boolean",
    "BigInt",
    "Symbol",
    "Math",
    "JSON",
    "Date",
    "RegExp",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "Promise",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "Intl",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "decodeURIComponent",
    "console",
];

/// Process-wide, read-only capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionCapabilities {
    entries: &'static [Capability],
    intrinsics: &'static [&'static str],
}

impl ExecutionCapabilities {
    pub const fn standard() -> Self {
        Self {
            entries: STANDARD,
            intrinsics: INTRINSICS,
        }
    }

    pub fn entries(&self) -> &'static [Capability] {
        self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|c| c.name.to_string()).collect()
    }

    pub fn intrinsic_names(&self) -> Vec<String> {
        self.intrinsics.iter().map(|n| n.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|c| c.name == name)
    }
}

impl Default for ExecutionCapabilities {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(caps: &ExecutionCapabilities, name: &str) -> Option<CapabilityKind> {
        caps.entries().iter().find(|c| c.name == name).map(|c| c.kind)
    }

    #[test]
    fn standard_table_covers_required_primitives() {
        let caps = ExecutionCapabilities::standard();
        assert_eq!(kind_of(&caps, "createElement"), Some(CapabilityKind::TreeConstructor));
        assert_eq!(kind_of(&caps, "useState"), Some(CapabilityKind::State));
        assert_eq!(kind_of(&caps, "useEffect"), Some(CapabilityKind::Effect));
        assert_eq!(kind_of(&caps, "useRef"), Some(CapabilityKind::Ref));
        assert_eq!(kind_of(&caps, "useCallback"), Some(CapabilityKind::MemoizedCallback));
    }

    #[test]
    fn host_globals_are_not_exposed() {
        let caps = ExecutionCapabilities::standard();
        for name in ["Deno", "globalThis", "window", "document", "fetch", "localStorage", "eval", "Function"] {
            assert!(!caps.contains(name), "{} must not be a capability", name);
            assert!(!caps.intrinsic_names().iter().any(|n| n == name), "{} must not be an intrinsic", name);
        }
    }

    #[test]
    fn names_are_unique() {
        let caps = ExecutionCapabilities::standard();
        let mut names = caps.names();
        names.extend(caps.intrinsic_names());
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
