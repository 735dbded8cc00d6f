//! Lua code compiled into the binary and run once at startup, in order,
//! before any upload is accepted.

/// One embedded script.
#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub source: &'static str,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "base.lua",
        source: include_str!("builtin/base.lua"),
    },
    Builtin {
        name: "util.lua",
        source: include_str!("builtin/util.lua"),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_runs_first() {
        assert_eq!(BUILTINS[0].name, "base.lua");
        assert!(BUILTINS[0].source.contains("function process()"));
    }
}
