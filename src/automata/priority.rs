//! Relative priorities of epsilon paths.
//!
//! Every `Fork` splits the priority of the path reaching it into a higher
//! and a lower half, binary-search style:
//!
//! ```text
//!                -> 3/4 ...
//!               /
//!        -> 1/2 --> 2/4 ...
//!       /
//!      /       ---> 1/4 ...
//!     /       /
//!   0 ----> 0 ----> 0   ...
//! ```
//!
//! A priority is the dyadic fraction `num / 2^depth`.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Shifts `x` left, saturating instead of dropping bits.
fn align(x: u64, shift: u32) -> u128 {
    if x == 0 {
        0
    } else if shift >= 64 {
        u128::MAX
    } else {
        (x as u128) << shift
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct Priority {
    num: u64,
    depth: u32,
}

impl Priority {
    pub const ROOT: Priority = Priority { num: 0, depth: 0 };

    pub fn new(num: u64, depth: u32) -> Priority {
        Priority { num, depth }
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn refine_higher(self) -> Priority {
        self.check_refinable();
        Priority {
            num: 2 * self.num + 1,
            depth: self.depth + 1,
        }
    }

    pub fn refine_lower(self) -> Priority {
        self.check_refinable();
        Priority {
            num: 2 * self.num,
            depth: self.depth + 1,
        }
    }

    fn check_refinable(&self) {
        assert!(
            self.num <= u64::MAX / 4 && self.depth < 126,
            "priority {} cannot be refined any further",
            self
        );
    }

    /// Priorities for `n` points ranked from lowest to highest, such that
    /// every point's refinements stay clear of its neighbours.
    pub fn ranked(n: usize) -> impl Iterator<Item = Priority> {
        let depth = (n.max(1) as u64).next_power_of_two().trailing_zeros();
        (0..n as u64).map(move |num| Priority { num, depth })
    }

    /// Orders two priorities. Priorities produced along different paths
    /// from a common ancestor never compare equal.
    pub fn compare(&self, other: &Priority) -> Ordering {
        let (x, y) = match self.depth.cmp(&other.depth) {
            Ordering::Greater => (self.num as u128, align(other.num, self.depth - other.depth)),
            Ordering::Less => (align(self.num, other.depth - self.depth), other.num as u128),
            Ordering::Equal => (self.num as u128, other.num as u128),
        };
        // 0/n against 0/m: the deeper zero came from more refine_lower steps.
        if x == 0 && y == 0 {
            return other.depth.cmp(&self.depth);
        }
        x.cmp(&y)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/2^{}", self.num, self.depth)
    }
}
