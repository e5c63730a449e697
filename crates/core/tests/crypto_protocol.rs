// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use pfrsim_core::address_map::layout::CRYPTO;
use pfrsim_core::bus::SystemBus;
use pfrsim_core::peripherals::crypto::{
    operand_words, CryptoCsr, CSR, DATA, LENGTH, P256_CURVE_PARAMS, SHA_BASE,
};
use pfrsim_core::system::PlatformBuilder;
use pfrsim_core::{FaultPolicy, SimulationError};
use sha2::{Digest, Sha256};

fn bus() -> SystemBus {
    PlatformBuilder::new()
        .fault_policy(FaultPolicy::Error)
        .flash_sizes(0x10_0000, 0x10_0000)
        .build()
        .unwrap()
        .bus
}

fn reg(offset: u32) -> u32 {
    CRYPTO.base + offset
}

fn write_message(bus: &mut SystemBus, msg: &[u8]) {
    for chunk in msg.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        bus.write(reg(DATA), u32::from_le_bytes(word)).unwrap();
    }
}

fn write_operand(bus: &mut SystemBus, operand: &[u8; 32]) {
    for word in operand_words(operand) {
        bus.write(reg(DATA), word).unwrap();
    }
}

/// Poll CSR until DONE, returning the final value and how many reads it took.
fn poll_done(bus: &mut SystemBus) -> (u32, u32) {
    for polls in 1..=100 {
        let csr = bus.read(reg(CSR)).unwrap();
        if csr & CryptoCsr::DONE.bits() != 0 {
            return (csr, polls);
        }
    }
    panic!("crypto engine never reported DONE");
}

/// Digest as firmware sees it: SHA register 0 holds the last digest word.
fn read_digest(bus: &mut SystemBus) -> [u8; 32] {
    let mut digest = [0u8; 32];
    for i in 0..8u32 {
        let word = bus.read(reg(SHA_BASE + 4 * i)).unwrap();
        let at = 4 * (7 - i as usize);
        digest[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
    digest
}

fn key_operands(key: &SigningKey) -> ([u8; 32], [u8; 32]) {
    let point = key.verifying_key().to_encoded_point(false);
    let mut x = [0u8; 32];
    let mut y = [0u8; 32];
    x.copy_from_slice(point.x().unwrap());
    y.copy_from_slice(point.y().unwrap());
    (x, y)
}

/// Run a verify session; `operands` are public key X/Y and signature R/S.
fn verify(bus: &mut SystemBus, msg: &[u8], operands: [&[u8; 32]; 4]) -> u32 {
    bus.write(reg(LENGTH), msg.len() as u32).unwrap();
    bus.write(reg(CSR), CryptoCsr::START_VERIFY.bits()).unwrap();
    write_message(bus, msg);
    for operand in operands {
        write_operand(bus, operand);
    }
    for param in &P256_CURVE_PARAMS {
        write_operand(bus, param);
    }
    poll_done(bus).0
}

#[test]
fn test_hash_session_over_the_bus() {
    let mut bus = bus();
    let msg: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

    bus.write(reg(LENGTH), msg.len() as u32).unwrap();
    bus.write(reg(CSR), CryptoCsr::START_HASH.bits()).unwrap();
    write_message(&mut bus, &msg);

    let (csr, polls) = poll_done(&mut bus);
    assert_eq!(csr, CryptoCsr::DONE.bits());
    assert_eq!(polls, 10);
    assert_eq!(read_digest(&mut bus), <[u8; 32]>::from(Sha256::digest(&msg)));
}

#[test]
fn test_verify_good_and_tampered() {
    let mut bus = bus();
    let key = SigningKey::from_slice(&[0x17; 32]).unwrap();
    let msg = b"PFR manifest block 0";
    let sig: Signature = key.sign(msg);
    let (x, y) = key_operands(&key);
    let (r, s) = sig.split_bytes();
    let (r, s): ([u8; 32], [u8; 32]) = (r.into(), s.into());

    let csr = verify(&mut bus, msg, [&x, &y, &r, &s]);
    assert_eq!(csr, (CryptoCsr::DONE | CryptoCsr::SIGNATURE_GOOD).bits());
    assert_eq!(read_digest(&mut bus), <[u8; 32]>::from(Sha256::digest(msg)));

    let mut bad_r = r;
    bad_r[0] ^= 0x80;
    assert_eq!(verify(&mut bus, msg, [&x, &y, &bad_r, &s]), CryptoCsr::DONE.bits());

    let mut bad_s = s;
    bad_s[16] ^= 0x01;
    assert_eq!(verify(&mut bus, msg, [&x, &y, &r, &bad_s]), CryptoCsr::DONE.bits());

    let other = SigningKey::from_slice(&[0x18; 32]).unwrap();
    let (ox, oy) = key_operands(&other);
    assert_eq!(verify(&mut bus, msg, [&ox, &oy, &r, &s]), CryptoCsr::DONE.bits());
}

#[test]
fn test_data_read_is_protocol_fault() {
    let mut bus = bus();
    assert!(matches!(
        bus.read(reg(DATA)),
        Err(SimulationError::Protocol { .. })
    ));
}

#[test]
fn test_reset_aborts_session() {
    let mut bus = bus();
    bus.write(reg(LENGTH), 64).unwrap();
    bus.write(reg(CSR), CryptoCsr::START_HASH.bits()).unwrap();
    write_message(&mut bus, &[0u8; 32]);
    assert!(bus.write(reg(LENGTH), 8).is_err());

    bus.reset();
    bus.write(reg(LENGTH), 8).unwrap();
    assert_eq!(bus.read(reg(LENGTH)).unwrap(), 8);
}
