use serde::Serialize;

use crate::errors::Error;

pub type InstPtr = usize;

/// Number of symbols in the alphabet: the 128 ASCII bytes plus one
/// synthetic symbol standing for every byte outside ASCII.
pub const ALPHABET_SIZE: usize = 129;

/// The synthetic symbol for bytes `>= 128`.
pub const UNKNOWN_CHAR: u8 = 128;

/// Maps an input byte onto the alphabet.
pub fn symbol(b: u8) -> u8 {
    if b > 127 {
        UNKNOWN_CHAR
    } else {
        b
    }
}

/// Renders a symbol the way it would be written inside a C character
/// literal.
pub fn escape(c: u8) -> String {
    match c {
        0 => "\\0".to_string(),
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        b'\\' => "\\\\".to_string(),
        b'\'' => "\\'".to_string(),
        0x20..=0x7e => (c as char).to_string(),
        _ => format!("\\x{:02x}", c),
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub enum Inst {
    Char(InstChar),
    Fork(InstFork),
    Tag(InstTag),
    Goto(InstPtr),
    /// Only followed from the automaton's true start.
    Init(InstPtr),
    Accept(usize),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct CharRange {
    pub lb: u8,
    pub ub: u8,
    pub goto: InstPtr,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct InstChar {
    pub ranges: Vec<CharRange>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct InstFork {
    pub next: InstPtr,
    pub link: InstPtr,
    pub prefer_link: bool,
}

impl InstFork {
    /// Returns `(preferred, fallback)`.
    pub fn targets(&self) -> (InstPtr, InstPtr) {
        if self.prefer_link {
            (self.link, self.next)
        } else {
            (self.next, self.link)
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct InstTag {
    pub tag: usize,
    pub goto: InstPtr,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Program {
    pub insts: Vec<Inst>,
    pub start: InstPtr,
}

impl Program {
    /// Checks the contract the automaton construction relies on: a valid
    /// entry, no dangling successors, tag ids below `ntags` and character
    /// ranges inside the alphabet.
    pub fn validate(&self, ntags: usize) -> Result<(), Error> {
        let len = self.insts.len();
        if self.start >= len {
            return Err(Error::BadEntry(self.start));
        }
        let check = |ip: InstPtr, target: InstPtr| {
            if target >= len {
                Err(Error::DanglingTarget { ip, target })
            } else {
                Ok(())
            }
        };
        for (ip, inst) in self.insts.iter().enumerate() {
            match *inst {
                Inst::Char(ref ch) => {
                    for r in &ch.ranges {
                        if r.lb > r.ub || r.ub as usize >= ALPHABET_SIZE {
                            return Err(Error::BadCharRange {
                                ip,
                                lb: r.lb,
                                ub: r.ub,
                            });
                        }
                        check(ip, r.goto)?;
                    }
                }
                Inst::Fork(InstFork { next, link, .. }) => {
                    check(ip, next)?;
                    check(ip, link)?;
                }
                Inst::Tag(InstTag { tag, goto }) => {
                    if tag >= ntags {
                        return Err(Error::TagOutOfRange { ip, tag, ntags });
                    }
                    check(ip, goto)?;
                }
                Inst::Goto(goto) | Inst::Init(goto) => check(ip, goto)?,
                Inst::Accept(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn accept_a() -> Program {
        Program {
            insts: vec![
                Inst::Char(InstChar {
                    ranges: vec![CharRange {
                        lb: b'a',
                        ub: b'a',
                        goto: 1,
                    }],
                }),
                Inst::Accept(0),
            ],
            start: 0,
        }
    }

    #[test]
    fn valid() {
        assert_eq!(accept_a().validate(0), Ok(()));
    }

    #[test]
    fn dangling() {
        let mut p = accept_a();
        p.insts[1] = Inst::Goto(7);
        assert_eq!(
            p.validate(0),
            Err(Error::DanglingTarget { ip: 1, target: 7 })
        );
        p.start = 9;
        assert_eq!(p.validate(0), Err(Error::BadEntry(9)));
    }

    #[test]
    fn tag_range() {
        let mut p = accept_a();
        p.insts.push(Inst::Tag(InstTag { tag: 2, goto: 1 }));
        assert_eq!(
            p.validate(2),
            Err(Error::TagOutOfRange {
                ip: 2,
                tag: 2,
                ntags: 2
            })
        );
        assert_eq!(p.validate(3), Ok(()));
    }

    #[test]
    fn char_range() {
        let mut p = accept_a();
        p.insts[0] = Inst::Char(InstChar {
            ranges: vec![CharRange {
                lb: b'z',
                ub: b'a',
                goto: 1,
            }],
        });
        assert_eq!(
            p.validate(0),
            Err(Error::BadCharRange {
                ip: 0,
                lb: b'z',
                ub: b'a'
            })
        );
    }

    #[test]
    fn fork_targets() {
        let f = InstFork {
            next: 1,
            link: 5,
            prefer_link: true,
        };
        assert_eq!(f.targets(), (5, 1));
        let f = InstFork {
            prefer_link: false,
            ..f
        };
        assert_eq!(f.targets(), (1, 5));
        assert_eq!(symbol(200), UNKNOWN_CHAR);
        assert_eq!(symbol(b'x'), b'x');
    }

    #[test]
    fn escapes() {
        assert_eq!(escape(0), "\\0");
        assert_eq!(escape(b'a'), "a");
        assert_eq!(escape(b'\''), "\\'");
        assert_eq!(escape(b'\\'), "\\\\");
        assert_eq!(escape(b'\n'), "\\n");
        assert_eq!(escape(1), "\\x01");
        assert_eq!(escape(UNKNOWN_CHAR), "\\x80");
    }
}
