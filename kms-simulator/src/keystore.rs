// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! In-memory symmetric keystore backing the simulator.
//!
//! Every label owns one AES-128 key whose bytes are the label itself, cut
//! (or zero-filled) to 16 bytes. That is not a key derivation function and
//! must never protect real data. Ciphertexts are framed as
//! `IV || AES-128-CTR(plaintext)` with a fresh random IV per call.

use std::collections::HashMap;

use aes::Aes128;
use ctr::cipher::generic_array::GenericArray;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{Error, Result};

pub const KEY_SIZE: usize = 16;
pub const IV_SIZE: usize = 16;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

struct SymmetricKey {
    material: Zeroizing<[u8; KEY_SIZE]>,
}

impl SymmetricKey {
    fn from_label(label: &str) -> Self {
        let mut material = Zeroizing::new([0u8; KEY_SIZE]);
        let bytes = label.as_bytes();
        let len = bytes.len().min(KEY_SIZE);
        material[..len].copy_from_slice(&bytes[..len]);
        Self { material }
    }

    fn keystream(&self, iv: &[u8]) -> Aes128Ctr {
        Aes128Ctr::new(
            GenericArray::from_slice(&self.material[..]),
            GenericArray::from_slice(iv),
        )
    }
}

/// Fixed set of keys, immutable once built.
pub struct Keystore {
    keys: HashMap<String, SymmetricKey>,
}

impl Keystore {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = labels
            .into_iter()
            .map(Into::into)
            .map(|label| {
                let key = SymmetricKey::from_label(&label);
                (label, key)
            })
            .collect();

        Self { keys }
    }

    /// Like [`Keystore::new`], but every label must be a key id of the form
    /// `{projectId}/{keyRingId}/{keyId}/{version}`.
    pub fn from_key_ids<I, S>(key_ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_ids: Vec<String> = key_ids.into_iter().map(Into::into).collect();
        if let Some(key_id) = key_ids.iter().find(|id| id.split('/').count() != 4) {
            return Err(Error::KeyFormat(key_id.clone()));
        }

        Ok(Self::new(key_ids))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    fn key(&self, label: &str) -> Result<&SymmetricKey> {
        self.keys
            .get(label)
            .ok_or_else(|| Error::KeyNotFound(label.to_string()))
    }

    pub fn encrypt(&self, label: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key(label)?;

        let mut ciphertext = vec![0u8; IV_SIZE + plaintext.len()];
        let (iv, body) = ciphertext.split_at_mut(IV_SIZE);
        rand::rng().fill_bytes(iv);
        body.copy_from_slice(plaintext);
        key.keystream(iv).apply_keystream(body);

        Ok(ciphertext)
    }

    pub fn decrypt(&self, label: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key(label)?;
        if ciphertext.len() < IV_SIZE {
            return Err(Error::CiphertextTooShort {
                len: ciphertext.len(),
                min: IV_SIZE,
            });
        }

        let (iv, body) = ciphertext.split_at(IV_SIZE);
        let mut plaintext = body.to_vec();
        key.keystream(iv).apply_keystream(&mut plaintext);

        Ok(plaintext)
    }
}
