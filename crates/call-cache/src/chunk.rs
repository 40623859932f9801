// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Splitting outdated calls into aggregate sized batches.

use std::ops::Range;

/// Split `items` into the fewest chunks of at most `max_chunk_size`, with
/// chunk sizes as even as possible. Order is preserved.
pub fn chunk_calls<T>(items: Vec<T>, max_chunk_size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let max_chunk_size = max_chunk_size.max(1);
    let num_chunks = items.len().div_ceil(max_chunk_size);
    let chunk_size = items.len().div_ceil(num_chunks);

    let mut chunks = Vec::with_capacity(num_chunks);
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Positions of each chunk inside the concatenation of all chunks.
pub fn chunk_ranges(chunk_lens: impl IntoIterator<Item = usize>) -> Vec<Range<usize>> {
    let mut start = 0;
    chunk_lens
        .into_iter()
        .map(|len| {
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}
