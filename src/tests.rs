//! Legatoのテストモジュール群
//!
//! 各コンポーネント(transform、classifier、features、tagger等)の
//! 動作を検証するテストを含みます。

mod analogy;
mod classifier;
mod features;
mod transform;

#[cfg(feature = "train")]
mod tagger;
