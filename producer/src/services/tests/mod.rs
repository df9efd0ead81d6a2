//! Tests for producer services against the real muxer-side protocol
