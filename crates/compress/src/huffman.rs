//! Length-limited canonical Huffman code construction.
//!
//! # Design
//!
//! [`build`] turns a symbol-frequency histogram into a canonical prefix code
//! in three stages:
//!
//! 1. A binary min-heap of `(frequency, depth, node)` keys is merged two
//!    entries at a time. Each internal node records the deeper of its
//!    children plus one, so ties prefer shallow subtrees.
//! 2. Leaf depths become code lengths. Lengths beyond the limit are folded
//!    onto the limit and the Kraft sum is repaired by repeatedly splitting the
//!    deepest leaf shorter than the limit into two leaves one level deeper,
//!    retiring one leaf at the limit for each split. The leaf count never
//!    changes.
//! 3. Codes are assigned in `(length, symbol)` order with the `next_code`
//!    rule and stored bit-reversed so they can be written LSB-first.
//!
//! # Invariants
//!
//! - Histograms with fewer than two used symbols still produce a complete
//!   one-bit code: the used symbol (if any) plus symbol `0` or `1`.
//! - Every returned code set satisfies `sum(2^-len) == 1` over used symbols.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One entry of a code table: a bit-reversed code and its length.
///
/// A length of zero marks an unused symbol.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct HuffmanCode {
    code: u16,
    len: u8,
}

impl HuffmanCode {
    /// Creates an entry from an already bit-reversed code.
    #[must_use]
    pub const fn new(code: u16, len: u8) -> Self {
        Self { code, len }
    }

    /// Bit-reversed code, ready for LSB-first output.
    #[must_use]
    pub const fn code(self) -> u16 {
        self.code
    }

    /// Code length in bits; zero for unused symbols.
    #[must_use]
    pub const fn len(self) -> u8 {
        self.len
    }

    /// Returns `true` for unused symbols.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Software packing: length in bits 31:24, code in bits 15:0.
    #[must_use]
    pub const fn packed(self) -> u32 {
        ((self.len as u32) << 24) | self.code as u32
    }

    /// Inverse of [`packed`](Self::packed).
    #[must_use]
    pub const fn from_packed(value: u32) -> Self {
        Self {
            code: value as u16,
            len: (value >> 24) as u8,
        }
    }

    /// Accelerator packing: 4-bit length in bits 18:15, 15-bit code below.
    #[must_use]
    pub const fn to_hw(self) -> u32 {
        (((self.len & 0x0F) as u32) << 15) | (self.code as u32 & 0x7FFF)
    }

    /// Inverse of [`to_hw`](Self::to_hw).
    #[must_use]
    pub const fn from_hw(value: u32) -> Self {
        Self {
            code: (value & 0x7FFF) as u16,
            len: ((value >> 15) & 0x0F) as u8,
        }
    }
}

/// Reverses the low `len` bits of `code`.
#[must_use]
pub const fn reverse_bits(code: u16, len: u8) -> u16 {
    if len == 0 {
        return 0;
    }
    code.reverse_bits() >> (16 - len as u32)
}

/// Builds a canonical code of at most `max_len` bits from `histogram`.
#[must_use]
pub fn build(histogram: &[u32], max_len: u8) -> Vec<HuffmanCode> {
    assign_codes(&build_code_lengths(histogram, max_len))
}

/// Computes length-limited code lengths for `histogram`.
#[must_use]
pub fn build_code_lengths(histogram: &[u32], max_len: u8) -> Vec<u8> {
    let mut lengths = vec![0u8; histogram.len()];
    let max_len = max_len.clamp(1, 15);

    let used: Vec<usize> = histogram
        .iter()
        .enumerate()
        .filter(|&(_, &freq)| freq != 0)
        .map(|(symbol, _)| symbol)
        .collect();

    if used.len() < 2 {
        assign_degenerate(&mut lengths, used.first().copied());
        logging::trace_huffman!(symbols = histogram.len(), "degenerate histogram");
        return lengths;
    }

    let depths = tree_depths(histogram, &used);
    let counts = limit_lengths(&depths, max_len);

    // Longest original depth first, then rarer symbols, then symbol order.
    let mut order: Vec<usize> = (0..used.len()).collect();
    order.sort_by_key(|&leaf| (Reverse(depths[leaf]), histogram[used[leaf]], used[leaf]));

    let mut leaves = order.into_iter();
    for len in (1..=max_len).rev() {
        for _ in 0..counts[usize::from(len)] {
            if let Some(leaf) = leaves.next() {
                lengths[used[leaf]] = len;
            }
        }
    }

    logging::trace_huffman!(
        symbols = histogram.len(),
        used = used.len(),
        max_len,
        "built code lengths"
    );
    lengths
}

fn assign_degenerate(lengths: &mut [u8], used: Option<usize>) {
    match (used, lengths.len()) {
        (_, 0) => {}
        (_, 1) => lengths[0] = 1,
        (None, _) => {
            lengths[0] = 1;
            lengths[1] = 1;
        }
        (Some(symbol), _) => {
            lengths[symbol] = 1;
            lengths[usize::from(symbol == 0)] = 1;
        }
    }
}

/// Merges the used symbols into a Huffman tree and returns each leaf's depth.
fn tree_depths(histogram: &[u32], used: &[usize]) -> Vec<u32> {
    let leaves = used.len();
    let nodes = 2 * leaves - 1;
    let mut parent = vec![usize::MAX; nodes];
    let mut depth = vec![0u32; nodes];

    let mut heap: BinaryHeap<Reverse<(u64, u32, usize)>> = used
        .iter()
        .enumerate()
        .map(|(leaf, &symbol)| Reverse((u64::from(histogram[symbol]), 0, leaf)))
        .collect();

    let mut next = leaves;
    while heap.len() > 1 {
        let (Some(Reverse((f1, d1, a))), Some(Reverse((f2, d2, b)))) = (heap.pop(), heap.pop())
        else {
            break;
        };
        parent[a] = next;
        parent[b] = next;
        depth[next] = d1.max(d2) + 1;
        heap.push(Reverse((f1 + f2, depth[next], next)));
        next += 1;
    }

    // Parents are always created after their children, so walking from the
    // root downwards resolves every depth in one pass.
    let mut code_len = vec![0u32; nodes];
    for node in (0..nodes.saturating_sub(1)).rev() {
        let up = parent[node];
        if up != usize::MAX {
            code_len[node] = code_len[up] + 1;
        }
    }
    code_len.truncate(leaves);
    code_len
}

/// Returns per-length leaf counts after enforcing `max_len`.
fn limit_lengths(depths: &[u32], max_len: u8) -> [u32; 16] {
    let max = usize::from(max_len);
    let mut counts = [0u32; 16];
    for &depth in depths {
        counts[(depth as usize).min(max)] += 1;
    }

    let capacity = 1u64 << max;
    let mut kraft: u64 = (1..=max)
        .map(|len| u64::from(counts[len]) << (max - len))
        .sum();

    while kraft > capacity {
        let Some(donor) = (1..max).rev().find(|&len| counts[len] != 0) else {
            break;
        };
        counts[donor] -= 1;
        counts[donor + 1] += 2;
        counts[max] = counts[max].saturating_sub(1);
        kraft -= 1;
    }
    counts
}

/// Assigns canonical, bit-reversed codes to a set of code lengths.
#[must_use]
pub fn assign_codes(lengths: &[u8]) -> Vec<HuffmanCode> {
    let mut bl_count = [0u32; 16];
    for &len in lengths {
        if len != 0 {
            bl_count[usize::from(len.min(15))] += 1;
        }
    }

    let mut next_code = [0u32; 16];
    let mut code = 0u32;
    for bits in 1..16 {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return HuffmanCode::default();
            }
            let slot = usize::from(len.min(15));
            let value = next_code[slot] as u16;
            next_code[slot] += 1;
            HuffmanCode::new(reverse_bits(value, len), len)
        })
        .collect()
}
