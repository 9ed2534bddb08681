//! Benchmark fixtures for pgcoll.
//!
//! - [`document_batch`]: deterministic `(id, body)` pairs of a fixed body size
//! - [`seeded_collection`]: a linked collection pre-filled with a batch

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use pgcoll::{Collection, Error};

/// `n` documents with ids `doc0..doc{n-1}` and `body_len`-byte bodies.
pub fn document_batch(n: usize, body_len: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| {
            let body: String = std::iter::repeat(char::from(b'a' + (i % 26) as u8))
                .take(body_len)
                .collect();
            (format!("doc{i}"), body)
        })
        .collect()
}

/// A collection named `name` holding `n` documents from [`document_batch`].
pub fn seeded_collection(name: &str, n: usize, body_len: usize) -> Result<Collection, Error> {
    let mut collection = Collection::new(name)?;
    collection.upsert_documents(document_batch(n, body_len))?;
    Ok(collection)
}
