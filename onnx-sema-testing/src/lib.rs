//! Internal testing utilities for the onnx-sema crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Run a test body over a table of cases.
///
/// Build a collection of `Case` structs which implement `Debug`, then call
/// `test_each` on it with the test body. Every case is run, even after one
/// fails. If any case panics, `test_each` panics afterwards with the number of
/// failures and their debug representations.
///
/// ## Example
///
/// ```
/// use onnx_sema_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     dims: [usize; 2],
///     expected: usize,
/// }
///
/// let cases = [
///     Case { dims: [2, 3], expected: 6 },
///     Case { dims: [0, 3], expected: 0 },
/// ];
///
/// cases.test_each(|Case { dims, expected }| {
///     assert_eq!(dims.iter().product::<usize>(), *expected);
/// });
/// ```
///
/// ## Passing cases by reference vs. value
///
/// `test_each` passes each case by reference so the case is still available
/// to report after a panic. `test_each_clone` and `test_each_value` pass owned
/// cases instead.
///
/// ## Unwind safety
///
/// Cases and the test function must be
/// [unwind safe](https://doc.rust-lang.org/std/panic/fn.catch_unwind.html).
/// If a case field is not, describe how to construct it and build it inside
/// the test body, or wrap it in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching any panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes a clone
    /// of each case to the test function.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes each case
    /// by value. The case is formatted before the test function runs, so that
    /// it can be reported if the test fails.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Clone + Debug + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| {
                let value = case.clone();
                std::panic::catch_unwind(move || test(value)).is_err()
            })
            .collect();
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let test = &test;
        let mut failures = Vec::new();
        for case in self {
            let case_str = format!("{:?}", case);
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push(case_str);
            }
        }
        report_failures(&failures);
    }
}

/// Assert that two float sequences have the same length and that each pair of
/// elements differs by at most `tolerance`.
///
/// ```
/// use onnx_sema_testing::assert_all_close;
///
/// assert_all_close(&[0.1 + 0.2, 1.0], &[0.3, 1.0], 1e-9);
/// ```
#[track_caller]
pub fn assert_all_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: {:?} vs {:?}",
        actual,
        expected
    );
    for (i, (x, y)) in actual.iter().zip(expected).enumerate() {
        let close = (x - y).abs() <= tolerance || (x.is_nan() && y.is_nan());
        assert!(
            close,
            "values differ at index {}: {} vs {} ({:?} vs {:?})",
            i, x, y, actual, expected
        );
    }
}
