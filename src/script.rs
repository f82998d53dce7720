//! Script Classification and Unlocking Data
//!
//! Recognizes the owning-script templates the signer knows how to spend and
//! builds the scriptSig / witness pieces for them. Classification is done on
//! raw bytes so that fork-specific templates (Zen replay protection) can be
//! matched alongside the standard Bitcoin ones.

use bitcoin::hashes::{hash160, Hash};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::ScriptBuf;

use crate::error::{SigningError, SigningResult};

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;
/// Horizen replay protection opcode
pub const OP_CHECKBLOCKATHEIGHT: u8 = 0xb4;

/// Classification of an owning (locking) script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    /// `<pubkey> OP_CHECKSIG`
    PayToPublicKey { public_key: Vec<u8> },
    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    PayToPublicKeyHash { hash: [u8; 20] },
    /// P2PKH followed by `<blockhash> <height> OP_CHECKBLOCKATHEIGHT`
    PayToPublicKeyHashReplay { hash: [u8; 20] },
    /// `OP_HASH160 <20> OP_EQUAL`
    PayToScriptHash { hash: [u8; 20] },
    /// `OP_0 <20>`
    PayToWitnessPublicKeyHash { hash: [u8; 20] },
    /// `OP_0 <32>`
    PayToWitnessScriptHash { program: [u8; 32] },
    /// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`
    Multisig { required: usize, public_keys: Vec<Vec<u8>> },
    /// Any other witness program (Taproot and future versions)
    WitnessProgram { version: u8, program: Vec<u8> },
    /// `OP_RETURN ...`
    NullData,
    NonStandard,
}

impl ScriptKind {
    /// Classify raw script bytes
    pub fn classify(script: &[u8]) -> ScriptKind {
        if let Some(hash) = match_p2pkh(script) {
            return ScriptKind::PayToPublicKeyHash { hash };
        }
        if let Some(hash) = match_p2pkh_replay(script) {
            return ScriptKind::PayToPublicKeyHashReplay { hash };
        }
        if script.len() == 23
            && script[0] == OP_HASH160
            && script[1] == 20
            && script[22] == OP_EQUAL
        {
            return ScriptKind::PayToScriptHash {
                hash: to_array(&script[2..22]),
            };
        }
        if script.len() == 22 && script[0] == OP_0 && script[1] == 20 {
            return ScriptKind::PayToWitnessPublicKeyHash {
                hash: to_array(&script[2..22]),
            };
        }
        if script.len() == 34 && script[0] == OP_0 && script[1] == 32 {
            return ScriptKind::PayToWitnessScriptHash {
                program: to_array(&script[2..34]),
            };
        }
        if let Some((version, program)) = match_witness_program(script) {
            return ScriptKind::WitnessProgram {
                version,
                program: program.to_vec(),
            };
        }
        if (script.len() == 35 && script[0] == 33 || script.len() == 67 && script[0] == 65)
            && script[script.len() - 1] == OP_CHECKSIG
        {
            return ScriptKind::PayToPublicKey {
                public_key: script[1..script.len() - 1].to_vec(),
            };
        }
        if let Some((required, public_keys)) = match_multisig(script) {
            return ScriptKind::Multisig {
                required,
                public_keys,
            };
        }
        if script.first() == Some(&OP_RETURN) {
            return ScriptKind::NullData;
        }
        ScriptKind::NonStandard
    }

    /// Rough per-input virtual size used for fee planning
    pub fn input_vsize(&self) -> u64 {
        match self {
            ScriptKind::PayToPublicKeyHash { .. } => 148,
            ScriptKind::PayToPublicKeyHashReplay { .. } => 148,
            ScriptKind::PayToPublicKey { .. } => 114,
            ScriptKind::PayToScriptHash { .. } => 91, // assume P2SH-P2WPKH
            ScriptKind::PayToWitnessPublicKeyHash { .. } => 68,
            ScriptKind::PayToWitnessScriptHash { .. } => 105,
            ScriptKind::Multisig { required, .. } => 50 + 74 * *required as u64,
            ScriptKind::WitnessProgram { .. } => 58,
            ScriptKind::NullData | ScriptKind::NonStandard => 148,
        }
    }
}

/// Per-output virtual size used for fee planning
pub fn output_vsize(script: &[u8]) -> u64 {
    // amount (8) + compact size + script
    8 + compact_size_len(script.len() as u64) + script.len() as u64
}

fn compact_size_len(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

fn match_p2pkh(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        Some(to_array(&script[3..23]))
    } else {
        None
    }
}

fn match_p2pkh_replay(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() <= 25 || script.last() != Some(&OP_CHECKBLOCKATHEIGHT) {
        return None;
    }
    let hash = match_p2pkh(&script[..25])?;
    // <blockhash> <height>
    let rest = &script[25..script.len() - 1];
    let (block_hash, rest) = read_push(rest)?;
    let (height, rest) = read_push(rest)?;
    if block_hash.len() != 32 || height.is_empty() || height.len() > 4 || !rest.is_empty() {
        return None;
    }
    Some(hash)
}

fn match_witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }
    let version = match script[0] {
        OP_0 => 0,
        op @ OP_1..=OP_16 => op - OP_1 + 1,
        _ => return None,
    };
    if script[1] as usize + 2 != script.len() {
        return None;
    }
    Some((version, &script[2..]))
}

fn match_multisig(script: &[u8]) -> Option<(usize, Vec<Vec<u8>>)> {
    if script.len() < 3 || script[script.len() - 1] != OP_CHECKMULTISIG {
        return None;
    }
    let required = small_int(script[0])?;
    let total = small_int(script[script.len() - 2])?;
    let mut rest = &script[1..script.len() - 2];
    let mut public_keys = Vec::new();
    while !rest.is_empty() {
        let (key, tail) = read_push(rest)?;
        if key.len() != 33 && key.len() != 65 {
            return None;
        }
        public_keys.push(key.to_vec());
        rest = tail;
    }
    if public_keys.len() != total || required == 0 || required > total {
        return None;
    }
    Some((required, public_keys))
}

fn small_int(op: u8) -> Option<usize> {
    match op {
        OP_1..=OP_16 => Some((op - OP_1 + 1) as usize),
        _ => None,
    }
}

/// Read one data push from the front of `script`
fn read_push(script: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&op, rest) = script.split_first()?;
    let (len, rest) = match op {
        0x01..=0x4b => (op as usize, rest),
        OP_PUSHDATA1 => {
            let (&len, rest) = rest.split_first()?;
            (len as usize, rest)
        }
        OP_PUSHDATA2 => {
            if rest.len() < 2 {
                return None;
            }
            (u16::from_le_bytes([rest[0], rest[1]]) as usize, &rest[2..])
        }
        OP_PUSHDATA4 => {
            if rest.len() < 4 {
                return None;
            }
            let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
            (usize::try_from(len).ok()?, &rest[4..])
        }
        _ => return None,
    };
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

/// Split a push-only script into its pushed items
pub fn decode_pushes(script: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut rest = script;
    let mut items = Vec::new();
    while !rest.is_empty() {
        if rest[0] == OP_0 {
            items.push(Vec::new());
            rest = &rest[1..];
            continue;
        }
        let (item, tail) = read_push(rest)?;
        items.push(item.to_vec());
        rest = tail;
    }
    Some(items)
}

/// Build a push-only script (scriptSig) from data items
pub fn push_all(items: &[Vec<u8>]) -> SigningResult<ScriptBuf> {
    let mut builder = Builder::new();
    for item in items {
        let push = PushBytesBuf::try_from(item.clone())
            .map_err(|_| SigningError::invalid_transaction("push data too large"))?;
        builder = builder.push_slice(push);
    }
    Ok(builder.into_script())
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(hash: &[u8; 20]) -> ScriptBuf {
    let mut bytes = Vec::with_capacity(25);
    bytes.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    bytes.extend_from_slice(hash);
    bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    ScriptBuf::from_bytes(bytes)
}

/// `OP_0 <hash>`
pub fn p2wpkh_script(hash: &[u8; 20]) -> ScriptBuf {
    let mut bytes = Vec::with_capacity(22);
    bytes.extend_from_slice(&[OP_0, 20]);
    bytes.extend_from_slice(hash);
    ScriptBuf::from_bytes(bytes)
}

/// Append a minimal data push
pub fn write_push(bytes: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        len @ 0..=0x4b => bytes.push(len as u8),
        len @ 0x4c..=0xff => bytes.extend_from_slice(&[OP_PUSHDATA1, len as u8]),
        len @ 0x100..=0xffff => {
            bytes.push(OP_PUSHDATA2);
            bytes.extend_from_slice(&(len as u16).to_le_bytes());
        }
        len => {
            bytes.push(OP_PUSHDATA4);
            bytes.extend_from_slice(&(len as u32).to_le_bytes());
        }
    }
    bytes.extend_from_slice(data);
}

/// `OP_RETURN <data>`
pub fn op_return_script(data: &[u8]) -> ScriptBuf {
    let mut bytes = vec![OP_RETURN];
    write_push(&mut bytes, data);
    ScriptBuf::from_bytes(bytes)
}

/// Append `<blockhash> <height> OP_CHECKBLOCKATHEIGHT` to a locking script
pub fn with_replay_protection(
    script: &[u8],
    block_hash: &[u8; 32],
    block_height: u32,
) -> SigningResult<ScriptBuf> {
    // block hash is pushed in internal (reversed display) byte order
    let mut hash = block_hash.to_vec();
    hash.reverse();
    let push = PushBytesBuf::try_from(hash)
        .map_err(|_| SigningError::planning("invalid replay block hash"))?;
    let mut bytes = Builder::from(script.to_vec())
        .push_slice(push)
        .push_int(block_height as i64)
        .into_script()
        .into_bytes();
    bytes.push(OP_CHECKBLOCKATHEIGHT);
    Ok(ScriptBuf::from_bytes(bytes))
}

/// HASH160 of arbitrary bytes
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}
