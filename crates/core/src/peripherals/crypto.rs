// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! SHA-256 / ECDSA P-256 crypto block.
//!
//! Register map:
//! - `0x00` CSR: write a start bit to begin a session, poll for DONE.
//! - `0x04` DATA: write-only input port (hash data, then verify operands).
//! - `0x08` LENGTH: byte count of the hash input.
//! - `0x10..=0x2C` SHA: digest words, most significant word first.
//!
//! Verify sessions take nine 32-byte operands after the hash data, in the
//! order of [`Operand`]. Each operand is written as eight words whose
//! little-endian bytes form the big-endian value.

use crate::{SimResult, SimulationError};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use sha2::{Digest, Sha256};
use std::any::Any;

pub const CSR: u32 = 0x00;
pub const DATA: u32 = 0x04;
pub const LENGTH: u32 = 0x08;
pub const SHA_BASE: u32 = 0x10;
pub const SHA_WORDS: u32 = 8;

pub const OPERAND_BYTES: usize = 32;
pub const OPERAND_COUNT: usize = 9;
pub const DEFAULT_DONE_LATENCY_READS: u32 = 10;

bitflags::bitflags! {
    /// Control/status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CryptoCsr: u32 {
        /// Hash the input, then verify an ECDSA P-256 signature over the digest.
        const START_VERIFY = 1 << 0;
        /// Hash the input only.
        const START_HASH = 1 << 1;
        const DONE = 1 << 8;
        const SIGNATURE_GOOD = 1 << 9;
    }
}

/// Verify operands in the order firmware writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    PublicKeyX = 0,
    PublicKeyY = 1,
    SignatureR = 2,
    SignatureS = 3,
    GeneratorX = 4,
    GeneratorY = 5,
    FieldPrime = 6,
    CoefficientA = 7,
    Order = 8,
}

const fn be_words(words: [u32; 8]) -> [u8; OPERAND_BYTES] {
    let mut out = [0u8; OPERAND_BYTES];
    let mut i = 0;
    while i < 8 {
        let b = words[i].to_be_bytes();
        out[4 * i] = b[0];
        out[4 * i + 1] = b[1];
        out[4 * i + 2] = b[2];
        out[4 * i + 3] = b[3];
        i += 1;
    }
    out
}

/// NIST P-256 domain parameters, big-endian, in operand order
/// (Gx, Gy, p, a, n).
pub const P256_CURVE_PARAMS: [[u8; OPERAND_BYTES]; 5] = [
    be_words([
        0x6B17D1F2, 0xE12C4247, 0xF8BCE6E5, 0x63A440F2, 0x77037D81, 0x2DEB33A0, 0xF4A13945,
        0xD898C296,
    ]),
    be_words([
        0x4FE342E2, 0xFE1A7F9B, 0x8EE7EB4A, 0x7C0F9E16, 0x2BCE3357, 0x6B315ECE, 0xCBB64068,
        0x37BF51F5,
    ]),
    be_words([
        0xFFFFFFFF, 0x00000001, 0x00000000, 0x00000000, 0x00000000, 0xFFFFFFFF, 0xFFFFFFFF,
        0xFFFFFFFF,
    ]),
    be_words([
        0xFFFFFFFF, 0x00000001, 0x00000000, 0x00000000, 0x00000000, 0xFFFFFFFF, 0xFFFFFFFF,
        0xFFFFFFFC,
    ]),
    be_words([
        0xFFFFFFFF, 0x00000000, 0xFFFFFFFF, 0xFFFFFFFF, 0xBCE6FAAD, 0xA7179E84, 0xF3B9CAC2,
        0xFC632551,
    ]),
];

/// Split a 32-byte big-endian operand into the words firmware writes to DATA.
pub fn operand_words(bytes: &[u8; OPERAND_BYTES]) -> [u32; 8] {
    let mut words = [0u32; 8];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoState {
    Idle,
    AcceptHashData,
    AcceptVerifyData,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoMode {
    Hash,
    HashAndVerify,
}

#[derive(Debug, serde::Serialize)]
pub struct CryptoEngine {
    state: CryptoState,
    mode: CryptoMode,
    length: u32,
    #[serde(skip)]
    input: Vec<u8>,
    #[serde(skip)]
    operands: [[u8; OPERAND_BYTES]; OPERAND_COUNT],
    #[serde(skip)]
    operand_buf: Vec<u8>,
    operands_received: usize,
    digest: [u8; 32],
    signature_good: bool,
    done_latency_reads: u32,
    reads_until_done: u32,
    sessions_completed: u64,
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self::with_done_latency(DEFAULT_DONE_LATENCY_READS)
    }

    /// `reads` CSR polls are needed in the done state before DONE shows.
    pub fn with_done_latency(reads: u32) -> Self {
        Self {
            state: CryptoState::Idle,
            mode: CryptoMode::Hash,
            length: 0,
            input: Vec::new(),
            operands: [[0; OPERAND_BYTES]; OPERAND_COUNT],
            operand_buf: Vec::with_capacity(OPERAND_BYTES),
            operands_received: 0,
            digest: [0; 32],
            signature_good: false,
            done_latency_reads: reads.max(1),
            reads_until_done: 0,
            sessions_completed: 0,
        }
    }

    pub fn state(&self) -> CryptoState {
        self.state
    }

    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    pub fn signature_good(&self) -> bool {
        self.signature_good
    }

    pub fn sessions_completed(&self) -> u64 {
        self.sessions_completed
    }

    fn accepts_setup(&self) -> bool {
        matches!(self.state, CryptoState::Idle | CryptoState::Done)
    }

    fn write_csr(&mut self, value: u32) -> SimResult<()> {
        let csr = CryptoCsr::from_bits_truncate(value);
        let mode = match (
            csr.contains(CryptoCsr::START_HASH),
            csr.contains(CryptoCsr::START_VERIFY),
        ) {
            (false, false) => return Ok(()),
            (true, true) => {
                return Err(SimulationError::protocol(
                    "crypto CSR write sets both hash and verify start bits",
                ))
            }
            (true, false) => CryptoMode::Hash,
            (false, true) => CryptoMode::HashAndVerify,
        };
        if !self.accepts_setup() {
            return Err(SimulationError::protocol(format!(
                "crypto session started while in {:?}",
                self.state
            )));
        }

        self.mode = mode;
        self.input.clear();
        self.operand_buf.clear();
        self.operands = [[0; OPERAND_BYTES]; OPERAND_COUNT];
        self.operands_received = 0;
        self.digest = [0; 32];
        self.signature_good = false;
        self.state = CryptoState::AcceptHashData;
        tracing::debug!("Crypto: {:?} session, {} bytes", mode, self.length);

        if self.length == 0 {
            self.finish_hash_data();
        }
        Ok(())
    }

    fn write_length(&mut self, value: u32) -> SimResult<()> {
        if !self.accepts_setup() {
            return Err(SimulationError::protocol(format!(
                "crypto LENGTH written while in {:?}",
                self.state
            )));
        }
        self.length = value;
        self.input.clear();
        self.state = CryptoState::Idle;
        Ok(())
    }

    fn write_data(&mut self, value: u32) -> SimResult<()> {
        match self.state {
            CryptoState::AcceptHashData => {
                let remaining = self.length as usize - self.input.len();
                let bytes = value.to_le_bytes();
                self.input
                    .extend_from_slice(&bytes[..remaining.min(bytes.len())]);
                if self.input.len() == self.length as usize {
                    self.finish_hash_data();
                }
                Ok(())
            }
            CryptoState::AcceptVerifyData => {
                self.operand_buf.extend_from_slice(&value.to_le_bytes());
                if self.operand_buf.len() == OPERAND_BYTES {
                    let slot = &mut self.operands[self.operands_received];
                    slot.copy_from_slice(&self.operand_buf);
                    self.operand_buf.clear();
                    self.operands_received += 1;
                    if self.operands_received == OPERAND_COUNT {
                        self.complete();
                    }
                }
                Ok(())
            }
            state => Err(SimulationError::protocol(format!(
                "crypto DATA written while in {:?}",
                state
            ))),
        }
    }

    fn finish_hash_data(&mut self) {
        match self.mode {
            CryptoMode::Hash => self.complete(),
            CryptoMode::HashAndVerify => self.state = CryptoState::AcceptVerifyData,
        }
    }

    fn complete(&mut self) {
        self.digest = Sha256::digest(&self.input).into();
        if self.mode == CryptoMode::HashAndVerify {
            self.signature_good = self.verify();
            tracing::info!(
                "Crypto: ECDSA P-256 signature {}",
                if self.signature_good { "good" } else { "bad" }
            );
        }
        self.state = CryptoState::Done;
        self.reads_until_done = self.done_latency_reads;
        self.sessions_completed += 1;
    }

    fn verify(&self) -> bool {
        let curve = &self.operands[Operand::GeneratorX as usize..];
        if curve[..] != P256_CURVE_PARAMS[..] {
            tracing::warn!("Crypto: verify operands do not describe NIST P-256");
            return false;
        }

        let x = FieldBytes::from(self.operands[Operand::PublicKeyX as usize]);
        let y = FieldBytes::from(self.operands[Operand::PublicKeyY as usize]);
        let point = EncodedPoint::from_affine_coordinates(&x, &y, false);
        let Ok(key) = VerifyingKey::from_encoded_point(&point) else {
            tracing::debug!("Crypto: public key is not on the curve");
            return false;
        };

        let r = FieldBytes::from(self.operands[Operand::SignatureR as usize]);
        let s = FieldBytes::from(self.operands[Operand::SignatureS as usize]);
        let Ok(signature) = Signature::from_scalars(r, s) else {
            tracing::debug!("Crypto: signature scalars out of range");
            return false;
        };

        key.verify_prehash(&self.digest, &signature).is_ok()
    }

    fn read_csr(&mut self) -> u32 {
        if self.state != CryptoState::Done {
            return 0;
        }
        if self.reads_until_done > 1 {
            self.reads_until_done -= 1;
            return 0;
        }
        self.reads_until_done = 0;
        let mut csr = CryptoCsr::DONE;
        if self.signature_good {
            csr |= CryptoCsr::SIGNATURE_GOOD;
        }
        csr.bits()
    }

    fn read_sha(&self, offset: u32) -> u32 {
        if self.state != CryptoState::Done {
            return 0;
        }
        let word = (SHA_WORDS - 1 - (offset - SHA_BASE) / 4) as usize;
        let b = &self.digest[4 * word..4 * word + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl crate::Peripheral for CryptoEngine {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        match offset {
            CSR => Ok(self.read_csr()),
            DATA => Err(SimulationError::protocol("crypto DATA register is write-only")),
            LENGTH if self.accepts_setup() => Ok(self.length),
            LENGTH => Err(SimulationError::protocol(format!(
                "crypto LENGTH read while in {:?}",
                self.state
            ))),
            o if (SHA_BASE..SHA_BASE + 4 * SHA_WORDS).contains(&o) => Ok(self.read_sha(o)),
            _ => Err(SimulationError::protocol(format!(
                "no crypto register at offset {:#x}",
                offset
            ))),
        }
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            CSR => self.write_csr(value),
            DATA => self.write_data(value),
            LENGTH => self.write_length(value),
            o if (SHA_BASE..SHA_BASE + 4 * SHA_WORDS).contains(&o) => Err(
                SimulationError::protocol("crypto SHA registers are read-only"),
            ),
            _ => Err(SimulationError::protocol(format!(
                "no crypto register at offset {:#x}",
                offset
            ))),
        }
    }

    fn reset(&mut self) {
        *self = Self::with_done_latency(self.done_latency_reads);
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
