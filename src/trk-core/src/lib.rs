// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod fix;
pub mod geo;
pub mod sampling;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use fix::Fix;
pub use sampling::{SampleGate, SampleVerdict, SamplingConfig};
