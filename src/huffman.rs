//! Canonical Huffman table construction and a nibble-indexed decoder.
//!
//! Per spec, decoding proceeds 4 bits (one nibble) at a time through a
//! precomputed state machine instead of bit-by-bit, trading table-build
//! cost for a decode loop that only ever touches whole nibbles. A state is
//! a bit-prefix that hasn't yet completed a code; the transition for a
//! given state and incoming nibble greedily strips as many complete codes
//! off the front of `state_prefix ++ nibble` as it can, emitting their
//! symbols, and the leftover bits become the next state.
use std::collections::{HashMap, VecDeque};

use crate::bitreader::read_bits;
use crate::errors::DecodeErrors;

/// Where a transition goes once its emitted symbols (if any) are accounted
/// for.
#[derive(Clone, Copy, Debug)]
enum NextState
{
    State(usize),
    /// The accumulated bits cannot be completed by any code in this table;
    /// a conforming encoder never produces this, so reaching it means
    /// corrupt input.
    Invalid
}

/// One entry of a state's 16-way (or, for the realignment tables, 2/4/8-way)
/// transition table.
#[derive(Clone, Debug, Default)]
struct Transition
{
    /// Symbols completed by stripping codes off the front, in order.
    emitted: Vec<u8>,
    /// Bits of *this* input chunk (nibble or realignment chunk) consumed to
    /// complete the first emitted symbol. Meaningless if `emitted` is empty.
    first_len: u8,
    next: NextStateOrDefault
}

// `NextState` has no sensible default, so `Transition::default()` (used only
// as a BFS placeholder before a state is processed) needs a thin wrapper.
#[derive(Clone, Copy, Debug)]
struct NextStateOrDefault(NextState);
impl Default for NextStateOrDefault
{
    fn default() -> Self
    {
        NextStateOrDefault(NextState::Invalid)
    }
}

/// A canonical Huffman code table plus its precomputed nibble DFA.
pub struct HuffmanTable
{
    /// `(length, code) -> symbol`, built straight from the canonical
    /// construction rule.
    codes: HashMap<(u8, u32), u8>,
    /// Main DFA, 16 transitions per state, entered once the bit cursor is
    /// nibble-aligned.
    states: Vec<[Transition; 16]>,
    /// Realignment tables for a cursor that starts `r` bits short of a
    /// nibble boundary, `r in {1,2,3}`; index `r-1` has `2^r` entries.
    sentinels: [Vec<Transition>; 3]
}

impl HuffmanTable
{
    /// Build a table from the 16 per-length symbol counts and the
    /// concatenated symbol list of a DHT payload.
    ///
    /// # Errors
    /// [`DecodeErrors::InvalidHuffman`] if the counts and symbol list
    /// disagree, or [`DecodeErrors::InvalidTable`] if a code would need
    /// more than 16 bits.
    pub fn new(counts: &[u8; 16], symbols: &[u8]) -> Result<HuffmanTable, DecodeErrors>
    {
        let codes = build_canonical_codes(counts, symbols)?;
        let (states, sentinels) = build_dfa(&codes);
        Ok(HuffmanTable {
            codes,
            states,
            sentinels
        })
    }

    /// Decode one symbol starting at `(byte_index, bit_index)` of `buf`.
    ///
    /// Returns the cursor position right after that symbol and the symbol
    /// value.
    ///
    /// # Errors
    /// [`DecodeErrors::Truncation`] if the buffer runs out before a code
    /// completes (including the JPEG-legal case of up to 7 padding bits at
    /// the very end of the entropy-coded segment); [`DecodeErrors::InvalidHuffman`]
    /// if the bits decoded don't form a prefix of any code in this table.
    pub fn decode_single(
        &self, buf: &[u8], i: usize, b: u8
    ) -> Result<(usize, u8, u8), DecodeErrors>
    {
        let r = (4 - (b % 4)) % 4;

        let (mut cur_i, mut cur_b, mut state_id);

        if r > 0
        {
            let (_, _, val) = read_bits(buf, i, b, r)?;
            let sentinel = &self.sentinels[usize::from(r - 1)][val as usize];

            if let Some(&sym) = sentinel.emitted.first()
            {
                let (ni, nb) = advance(i, b, sentinel.first_len);
                return Ok((ni, nb, sym));
            }

            match sentinel.next.0
            {
                NextState::Invalid =>
                {
                    return Err(DecodeErrors::InvalidHuffman(
                        "No code matches the realignment bits".to_string()
                    ));
                }
                NextState::State(id) =>
                {
                    let (ni, nb) = advance(i, b, r);
                    cur_i = ni;
                    cur_b = nb;
                    state_id = id;
                }
            }
        }
        else
        {
            cur_i = i;
            cur_b = b;
            state_id = 0;
        }

        loop
        {
            let (ni, nb, nibble) = read_bits(buf, cur_i, cur_b, 4).map_err(|_| {
                DecodeErrors::Truncation(
                    "Ran out of bits mid-way through a Huffman symbol".to_string()
                )
            })?;

            let trans = &self.states[state_id][nibble as usize];

            if let Some(&sym) = trans.emitted.first()
            {
                let (fi, fb) = advance(cur_i, cur_b, trans.first_len);
                return Ok((fi, fb, sym));
            }

            match trans.next.0
            {
                NextState::Invalid =>
                {
                    return Err(DecodeErrors::InvalidHuffman(
                        "No code in this table matches the bits decoded so far".to_string()
                    ));
                }
                NextState::State(id) =>
                {
                    cur_i = ni;
                    cur_b = nb;
                    state_id = id;
                }
            }
        }
    }

    /// Decode every symbol in `buf`, consuming it nibble by nibble from bit
    /// 0. Used by tests to check the DFA against naive longest-prefix
    /// matching over a whole buffer.
    #[must_use]
    pub fn decode_buffer(&self, buf: &[u8]) -> Vec<u8>
    {
        let mut out = Vec::new();
        let mut state = 0usize;
        let mut i = 0usize;
        let mut b = 0u8;

        while let Ok((ni, nb, nibble)) = read_bits(buf, i, b, 4)
        {
            let trans = &self.states[state][nibble as usize];
            out.extend_from_slice(&trans.emitted);

            match trans.next.0
            {
                NextState::State(id) => state = id,
                NextState::Invalid => break
            }
            i = ni;
            b = nb;
        }
        out
    }

    /// Naive longest-prefix decode of a bit sequence against the raw code
    /// map, used only to cross-check the DFA in tests.
    #[cfg(test)]
    fn naive_decode_all(&self, bits: &[u8]) -> Vec<u8>
    {
        let mut out = Vec::new();
        let mut acc: u32 = 0;
        let mut len = 0u8;
        for &bit in bits
        {
            acc = (acc << 1) | u32::from(bit);
            len += 1;
            for l in 1..=len
            {
                let candidate = (acc >> (len - l)) & ((1u32 << l) - 1);
                if let Some(&sym) = self.codes.get(&(l, candidate))
                {
                    out.push(sym);
                    acc = 0;
                    len = 0;
                    break;
                }
            }
        }
        out
    }
}

/// Build `(length, code) -> symbol` via the standard canonical-code
/// construction: `nextCode` starts at 0; for each length `1..=16`, the
/// `count[len]` symbols at that length get consecutive codes, then
/// `nextCode = (nextCode + count[len]) << 1`.
fn build_canonical_codes(
    counts: &[u8; 16], symbols: &[u8]
) -> Result<HashMap<(u8, u32), u8>, DecodeErrors>
{
    let mut codes = HashMap::new();
    let mut next_code: u32 = 0;
    let mut k = 0usize;

    for len in 1..=16u8
    {
        let count = usize::from(counts[usize::from(len) - 1]);
        for _ in 0..count
        {
            let symbol = *symbols.get(k).ok_or_else(|| {
                DecodeErrors::InvalidHuffman(
                    "Symbol count counts claims more codes than symbols were supplied".to_string()
                )
            })?;
            codes.insert((len, next_code), symbol);
            next_code += 1;
            k += 1;
        }
        next_code <<= 1;
    }

    if k != symbols.len()
    {
        return Err(DecodeErrors::InvalidHuffman(format!(
            "DHT declared {} symbols via length counts but supplied {}",
            k,
            symbols.len()
        )));
    }

    Ok(codes)
}

enum StepOutcome
{
    Valid
    {
        emitted: Vec<u8>,
        first_len: u8,
        rem_len: u8,
        rem_bits: u32
    },
    Invalid
}

/// Concatenate `state_len` bits of `state_bits` with `in_len` bits of
/// `in_val`, then greedily strip complete codes off the front.
fn step(
    codes: &HashMap<(u8, u32), u8>, state_len: u8, state_bits: u32, in_val: u32, in_len: u8
) -> StepOutcome
{
    let mut len = state_len + in_len;
    let mut bits = (state_bits << in_len) | in_val;
    let mut emitted = Vec::new();
    let mut first_len = 0u8;
    let mut first = true;

    loop
    {
        if len == 0
        {
            break;
        }
        let max_l = len.min(16);
        let mut matched = None;
        for l in 1..=max_l
        {
            let candidate = (bits >> (len - l)) & ((1u32 << l) - 1);
            if let Some(&sym) = codes.get(&(l, candidate))
            {
                matched = Some((l, sym));
                break;
            }
        }
        let Some((l, sym)) = matched
        else
        {
            break;
        };

        if first
        {
            first_len = l.saturating_sub(state_len);
            first = false;
        }
        emitted.push(sym);
        len -= l;
        bits &= if len == 0 { 0 } else { (1u32 << len) - 1 };
    }

    if len > 15
    {
        return StepOutcome::Invalid;
    }

    StepOutcome::Valid {
        emitted,
        first_len,
        rem_len: len,
        rem_bits: bits
    }
}

/// Breadth-first build of the nibble DFA plus the three realignment
/// tables. Every `(len, bits)` prefix reachable either from the root by a
/// sequence of nibble steps, or by a 1/2/3-bit realignment step followed by
/// nibble steps, gets a state id.
fn build_dfa(codes: &HashMap<(u8, u32), u8>) -> (Vec<[Transition; 16]>, [Vec<Transition>; 3])
{
    let mut state_ids: HashMap<(u8, u32), usize> = HashMap::new();
    let mut states: Vec<[Transition; 16]> = Vec::new();
    let mut queue: VecDeque<(u8, u32, usize)> = VecDeque::new();

    state_ids.insert((0, 0), 0);
    states.push(Default::default());
    queue.push_back((0, 0, 0));

    // Processes every queued state's 16 nibble transitions, discovering and
    // enqueueing any not-yet-seen remainder states along the way.
    macro_rules! drain_queue {
        () => {
            while let Some((len, bits, id)) = queue.pop_front()
            {
                let mut trans: [Transition; 16] = Default::default();
                for nib in 0..16u32
                {
                    trans[nib as usize] = match step(codes, len, bits, nib, 4)
                    {
                        StepOutcome::Invalid => Transition {
                            emitted: Vec::new(),
                            first_len: 0,
                            next: NextStateOrDefault(NextState::Invalid)
                        },
                        StepOutcome::Valid {
                            emitted,
                            first_len,
                            rem_len,
                            rem_bits
                        } =>
                        {
                            let next_id = *state_ids.entry((rem_len, rem_bits)).or_insert_with(|| {
                                let nid = states.len();
                                states.push(Default::default());
                                queue.push_back((rem_len, rem_bits, nid));
                                nid
                            });
                            Transition {
                                emitted,
                                first_len,
                                next: NextStateOrDefault(NextState::State(next_id))
                            }
                        }
                    };
                }
                states[id] = trans;
            }
        };
    }

    drain_queue!();

    let mut sentinels: [Vec<Transition>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for r in 1u8..=3
    {
        let mut table = Vec::with_capacity(1 << r);
        for v in 0..(1u32 << r)
        {
            let entry = match step(codes, 0, 0, v, r)
            {
                StepOutcome::Invalid => Transition {
                    emitted: Vec::new(),
                    first_len: 0,
                    next: NextStateOrDefault(NextState::Invalid)
                },
                StepOutcome::Valid {
                    emitted,
                    first_len,
                    rem_len,
                    rem_bits
                } =>
                {
                    let next_id = *state_ids.entry((rem_len, rem_bits)).or_insert_with(|| {
                        let nid = states.len();
                        states.push(Default::default());
                        queue.push_back((rem_len, rem_bits, nid));
                        nid
                    });
                    Transition {
                        emitted,
                        first_len,
                        next: NextStateOrDefault(NextState::State(next_id))
                    }
                }
            };
            table.push(entry);
        }
        sentinels[usize::from(r - 1)] = table;
    }

    // Any states freshly discovered while building the sentinel tables still
    // need their own nibble transitions computed.
    drain_queue!();

    (states, sentinels)
}

fn advance(i: usize, b: u8, n: u8) -> (usize, u8)
{
    let total = usize::from(b) + usize::from(n);
    (i + total / 8, (total % 8) as u8)
}
