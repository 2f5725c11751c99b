// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

/// `ceil(a / b)` for positive `b`.
#[inline]
pub fn div_round_up(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

/// Rounds `a` up to the next multiple of `b`.
#[inline]
pub fn round_up(a: usize, b: usize) -> usize {
    a.div_ceil(b) * b
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(div_round_up(16, 8), 2);
        assert_eq!(div_round_up(17, 8), 3);
        assert_eq!(div_round_up(0, 8), 0);
        assert_eq!(round_up(5, 2), 6);
        assert_eq!(round_up(6, 2), 6);
    }

    #[test]
    fn round_up_is_multiple() {
        arbtest::arbtest(|u| {
            let a = u.int_in_range(0..=1usize << 20)?;
            let b = u.int_in_range(1..=64usize)?;
            let r = round_up(a, b);
            assert_eq!(r % b, 0);
            assert!(r >= a && r - a < b);
            Ok(())
        });
    }
}
