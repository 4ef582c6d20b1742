//! Longest-common-subsequence alignment of two sequences into edit opcodes.

use std::ops::Range;

/// What an opcode does to turn the old range into the new one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// One aligned stretch of the two sequences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub old: Range<usize>,
    pub new: Range<usize>,
}

impl Opcode {
    fn new(tag: OpTag, old: Range<usize>, new: Range<usize>) -> Self {
        Self { tag, old, new }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Delete,
    Insert,
}

/// Opcodes that transform `old` into `new`
///
/// Adjacent deletions and insertions between two equal stretches are merged
/// into a single `Replace`. Ranges are contiguous and cover both sequences.
pub fn opcodes<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Opcode> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];

    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(Opcode::new(OpTag::Equal, 0..prefix, 0..prefix));
    }
    ops.extend(group_steps(&lcs_steps(a, b), prefix));
    if suffix > 0 {
        ops.push(Opcode::new(
            OpTag::Equal,
            old.len() - suffix..old.len(),
            new.len() - suffix..new.len(),
        ));
    }
    ops
}

/// Edit script from a suffix LCS table
fn lcs_steps<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Step> {
    let (n, m) = (a.len(), b.len());
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            steps.push(Step::Keep);
            i += 1;
            j += 1;
        } else if j >= m || (i < n && lcs[i + 1][j] >= lcs[i][j + 1]) {
            steps.push(Step::Delete);
            i += 1;
        } else {
            steps.push(Step::Insert);
            j += 1;
        }
    }
    steps
}

/// Collapse single steps into ranged opcodes, shifted by `offset`
fn group_steps(steps: &[Step], offset: usize) -> Vec<Opcode> {
    let mut ops = Vec::new();
    let (mut i, mut j) = (offset, offset);
    let mut k = 0;

    while k < steps.len() {
        let (start_i, start_j) = (i, j);
        if steps[k] == Step::Keep {
            while k < steps.len() && steps[k] == Step::Keep {
                i += 1;
                j += 1;
                k += 1;
            }
            ops.push(Opcode::new(OpTag::Equal, start_i..i, start_j..j));
        } else {
            while k < steps.len() && steps[k] != Step::Keep {
                match steps[k] {
                    Step::Delete => i += 1,
                    Step::Insert => j += 1,
                    Step::Keep => unreachable!(),
                }
                k += 1;
            }
            let tag = match (i > start_i, j > start_j) {
                (true, true) => OpTag::Replace,
                (true, false) => OpTag::Delete,
                _ => OpTag::Insert,
            };
            ops.push(Opcode::new(tag, start_i..i, start_j..j));
        }
    }
    ops
}
