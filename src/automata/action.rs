use serde::Serialize;
use std::fmt;

/// Coordinates `m[tag, version]` of a capture slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct MapItem {
    pub tag: usize,
    pub version: usize,
}

impl MapItem {
    pub fn new(tag: usize, version: usize) -> MapItem {
        MapItem { tag, version }
    }
}

impl fmt::Display for MapItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m[{},{}]", self.tag, self.version)
    }
}

/// One instruction attached to a transition or a finalizer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum TdfaInsn {
    /// `to <- p`
    SavePos { to: MapItem },
    /// `to <- from`
    Copy { to: MapItem, from: MapItem },
    /// `t[tag] <- from`
    SaveTag { tag: usize, from: MapItem },
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Action(pub Vec<TdfaInsn>);

impl Action {
    pub fn new() -> Action {
        Action(vec![])
    }

    pub fn push(&mut self, insn: TdfaInsn) {
        self.0.push(insn);
    }

    pub fn extend(&mut self, other: Action) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TdfaInsn> {
        self.0.iter()
    }

    /// The slot copied into output tag 0, if this is a finalizer that
    /// records one.
    pub fn tag_zero_source(&self) -> Option<MapItem> {
        self.iter().rev().find_map(|insn| match *insn {
            TdfaInsn::SaveTag { tag: 0, from } => Some(from),
            _ => None,
        })
    }
}

impl fmt::Display for TdfaInsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TdfaInsn::SavePos { to } => write!(f, "{} <- p", to),
            TdfaInsn::Copy { to, from } => write!(f, "{} <- {}", to, from),
            TdfaInsn::SaveTag { tag, from } => write!(f, "t[{}] <- {}", tag, from),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, insn) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", insn)?;
        }
        Ok(())
    }
}
