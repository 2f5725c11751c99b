// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#[cfg(feature = "tracing")]
#[allow(unused_imports)]
pub use tracing::{debug, error, info, instrument, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! __noop_log {
    ($($args:tt)*) => {
        ()
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub(crate) use {
    __noop_log as debug, __noop_log as error, __noop_log as info, __noop_log as trace,
    __noop_log as warn,
};

#[cfg(test)]
mod test {
    use super::*;

    fn log_kind(kind: u32) {
        match kind {
            0 => debug!("zero"),
            _ => trace!("kind {kind}"),
        }
    }

    #[test]
    fn usable_as_match_arm() {
        log_kind(0);
        log_kind(3);
    }
}
