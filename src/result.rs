//! Result carrier — a two-variant short-circuit type for the execution
//! pipeline. Distinct from [`crate::error::KernelError`]: this carries a
//! fully-formed [`crate::response::WireResponse`] on the "stop here" branch
//! rather than an error value, since routing/validation failures are
//! user-facing content, not exceptions (§4.3, §7).

use crate::response::WireResponse;

/// Either the pipeline should keep going with `T`, or it should stop and
/// hand the caller this response.
pub enum Outcome<T> {
    Proceed(T),
    Short(WireResponse),
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Proceed(value) => Outcome::Proceed(f(value)),
            Outcome::Short(resp) => Outcome::Short(resp),
        }
    }
}

/// Early-return out of a function via `?` when used with the `Outcome`
/// short-circuit convention: `let v = try_proceed!(outcome);`
#[macro_export]
macro_rules! try_proceed {
    ($outcome:expr) => {
        match $outcome {
            $crate::result::Outcome::Proceed(value) => value,
            $crate::result::Outcome::Short(resp) => return resp,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(n: i32) -> Outcome<i32> {
        if n < 0 {
            Outcome::Short(WireResponse::error("negative"))
        } else {
            Outcome::Proceed(n)
        }
    }

    fn run(n: i32) -> WireResponse {
        let value = try_proceed!(classify(n));
        WireResponse::text(format!("ok:{value}"))
    }

    #[test]
    fn proceeds_on_success() {
        let resp = run(5);
        assert!(!resp.is_error);
        assert_eq!(resp.content[0].as_text(), "ok:5");
    }

    #[test]
    fn short_circuits_on_failure() {
        let resp = run(-1);
        assert!(resp.is_error);
    }

    #[test]
    fn map_transforms_proceed_only() {
        let doubled = classify(3).map(|n| n * 2);
        match doubled {
            Outcome::Proceed(v) => assert_eq!(v, 6),
            Outcome::Short(_) => panic!("expected Proceed"),
        }
    }
}
