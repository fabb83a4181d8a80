//! Element-wise comparator: comparison, then combine into the destination,
//! then optional rising-edge detection.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    /// NaN compares false for everything except `Ne`.
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            Comparison::Eq => a == b,
            Comparison::Ne => a != b,
            Comparison::Gt => a > b,
            Comparison::Ge => a >= b,
            Comparison::Lt => a < b,
            Comparison::Le => a <= b,
        }
    }
}

/// How the comparison result lands in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combine {
    Assign,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Continuous,
    /// `current && !previous` on the combined values; index 0 is false.
    Edge,
}

/// Compare `a` against `b` into `dest`.
///
/// `temp` holds the combined values before edge detection. Returns `false`
/// and leaves `dest` untouched when `a` and `b` differ in length or `dest` /
/// `temp` are shorter than the inputs.
pub fn compare_into(
    a: &[f64],
    b: &[f64],
    dest: &mut [bool],
    temp: &mut [bool],
    cmp: Comparison,
    combine: Combine,
    trigger: Trigger,
) -> bool {
    let n = a.len();
    if b.len() != n || dest.len() < n || temp.len() < n {
        return false;
    }
    for i in 0..n {
        let v = cmp.apply(a[i], b[i]);
        temp[i] = match combine {
            Combine::Assign => v,
            Combine::And => dest[i] && v,
            Combine::Or => dest[i] || v,
        };
    }
    match trigger {
        Trigger::Continuous => dest[..n].copy_from_slice(&temp[..n]),
        Trigger::Edge => {
            for i in 0..n {
                dest[i] = i > 0 && temp[i] && !temp[i - 1];
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_continuous() {
        let a = [1.0, 3.0, 2.0];
        let b = [2.0, 2.0, 2.0];
        let mut dest = [false; 3];
        let mut temp = [false; 3];
        assert!(compare_into(&a, &b, &mut dest, &mut temp, Comparison::Gt, Combine::Assign, Trigger::Continuous));
        assert_eq!(dest, [false, true, false]);
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Ge, Combine::Assign, Trigger::Continuous);
        assert_eq!(dest, [false, true, true]);
    }

    #[test]
    fn test_and_or_combine() {
        let a = [1.0, 3.0, 2.0];
        let b = [2.0, 2.0, 2.0];
        let mut temp = [false; 3];
        let mut dest = [true, false, true];
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Ge, Combine::And, Trigger::Continuous);
        assert_eq!(dest, [false, false, true]);
        let mut dest = [true, false, false];
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Gt, Combine::Or, Trigger::Continuous);
        assert_eq!(dest, [true, true, false]);
    }

    #[test]
    fn test_edge_first_index_false() {
        let a = [5.0, 5.0, 1.0, 5.0];
        let b = [0.0; 4];
        let mut dest = [false; 4];
        let mut temp = [false; 4];
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Gt, Combine::Assign, Trigger::Edge);
        assert_eq!(dest, [false, false, false, true]);
        let a = [0.0, 5.0, 5.0, 0.0, 5.0];
        let b = [1.0; 5];
        let mut dest = [false; 5];
        let mut temp = [false; 5];
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Gt, Combine::Assign, Trigger::Edge);
        assert_eq!(dest, [false, true, false, false, true]);
    }

    #[test]
    fn test_edge_runs_on_combined_values() {
        // combined = [F, T, T, F]; the And mask kills bar 0 only
        let a = [5.0, 5.0, 5.0, 0.0];
        let b = [1.0; 4];
        let mut dest = [false, true, true, true];
        let mut temp = [false; 4];
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Gt, Combine::And, Trigger::Edge);
        assert_eq!(dest, [false, true, false, false]);
    }

    #[test]
    fn test_nan_compares_false() {
        let a = [f64::NAN, 1.0];
        let b = [1.0, f64::NAN];
        let mut dest = [true; 2];
        let mut temp = [false; 2];
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Le, Combine::Assign, Trigger::Continuous);
        assert_eq!(dest, [false, false]);
        compare_into(&a, &b, &mut dest, &mut temp, Comparison::Ne, Combine::Assign, Trigger::Continuous);
        assert_eq!(dest, [true, true]);
    }

    #[test]
    fn test_length_mismatch_is_reported_noop() {
        let mut dest = [true; 3];
        let mut temp = [false; 3];
        assert!(!compare_into(&[1.0; 3], &[1.0; 2], &mut dest, &mut temp, Comparison::Eq, Combine::Assign, Trigger::Continuous));
        assert_eq!(dest, [true; 3]);
        let mut short = [true; 2];
        assert!(!compare_into(&[1.0; 3], &[1.0; 3], &mut short, &mut temp, Comparison::Eq, Combine::Assign, Trigger::Continuous));
        assert_eq!(short, [true; 2]);
        let mut small_temp = [false; 1];
        assert!(!compare_into(&[1.0; 3], &[1.0; 3], &mut dest, &mut small_temp, Comparison::Ne, Combine::Assign, Trigger::Continuous));
        assert_eq!(dest, [true; 3]);
    }
}
