//! Assertion helpers of [`StepApi`].
//!
//! Every helper fails the step with a [`StepBreak::Failed`] located at the
//! caller, so that bodies read as a list of `?`-propagated checks.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::{
    domain::{StepExecution, StepId, StepSpec, TimeStats},
    engine::{Error, StepApi, StepBreak, StepResult},
};

impl StepApi<'_> {
    #[track_caller]
    fn check(&self, condition: bool, message: impl FnOnce() -> String) -> StepResult {
        if condition {
            Ok(())
        } else {
            Err(self.failure(message()).into())
        }
    }

    /// Fails the step unconditionally.
    ///
    /// # Errors
    ///
    /// Always [`StepBreak::Failed`].
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) -> StepResult {
        Err(self.failure(message).into())
    }

    /// Fails the step because it is not completely implemented.
    ///
    /// # Errors
    ///
    /// Always [`StepBreak::Failed`].
    #[track_caller]
    pub fn todo(&self, message: &str) -> StepResult {
        Err(self.failure(format!("TODO: {message}")).into())
    }

    /// Fails the step if `left == right`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when the values are equal.
    #[track_caller]
    pub fn ensure_ne<T: PartialEq + Debug>(&self, left: T, right: T) -> StepResult {
        self.check(left != right, || format!("{left:?} == {right:?}"))
    }

    /// Fails the step unless `value < bound`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when the comparison does not hold.
    #[track_caller]
    pub fn ensure_lt<T: PartialOrd + Debug>(&self, value: T, bound: T) -> StepResult {
        self.check(value < bound, || format!("{value:?} is not less than {bound:?}"))
    }

    /// Fails the step unless `value <= bound`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when the comparison does not hold.
    #[track_caller]
    pub fn ensure_le<T: PartialOrd + Debug>(&self, value: T, bound: T) -> StepResult {
        self.check(value <= bound, || {
            format!("{value:?} is not less than or equal to {bound:?}")
        })
    }

    /// Fails the step unless `value > bound`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when the comparison does not hold.
    #[track_caller]
    pub fn ensure_gt<T: PartialOrd + Debug>(&self, value: T, bound: T) -> StepResult {
        self.check(value > bound, || format!("{value:?} is not greater than {bound:?}"))
    }

    /// Fails the step unless `value >= bound`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when the comparison does not hold.
    #[track_caller]
    pub fn ensure_ge<T: PartialOrd + Debug>(&self, value: T, bound: T) -> StepResult {
        self.check(value >= bound, || {
            format!("{value:?} is not greater than or equal to {bound:?}")
        })
    }

    /// Fails the step unless `low < value < high`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `value` is out of the open range.
    #[track_caller]
    pub fn ensure_strictly_between<T: PartialOrd + Debug>(
        &self,
        value: T,
        low: T,
        high: T,
    ) -> StepResult {
        self.check(low < value && value < high, || {
            format!("{value:?} is not strictly between {low:?} and {high:?}")
        })
    }

    /// Fails the step unless `low <= value <= high`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `value` is out of the closed range.
    #[track_caller]
    pub fn ensure_between<T: PartialOrd + Debug>(&self, value: T, low: T, high: T) -> StepResult {
        self.check(low <= value && value <= high, || {
            format!("{value:?} is not between {low:?} and {high:?}")
        })
    }

    /// Fails the step unless `value` is within `margin` of `expected`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `value` is too far. A fatal context error
    /// if `margin` is negative.
    #[track_caller]
    pub fn ensure_near(&self, value: f64, expected: f64, margin: f64) -> StepResult {
        if margin < 0.0 {
            return Err(self.context_error("ensure_near(): margin should not be negative").into());
        }
        self.check((expected - margin..=expected + margin).contains(&value), || {
            format!(
                "{value} is not near {expected} (margin: {:.1}% i.e. {margin})",
                margin / expected * 100.0
            )
        })
    }

    /// Fails the step unless `value` is `None`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when a value is present.
    #[track_caller]
    pub fn ensure_none<T: Debug>(&self, value: Option<&T>) -> StepResult {
        self.check(value.is_none(), || format!("{value:?} is not None"))
    }

    /// Unwraps `value`, failing the step when it is `None`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when no value is present.
    #[track_caller]
    pub fn ensure_some<T>(&self, value: Option<T>, what: &str) -> Result<T, StepBreak> {
        match value {
            Some(value) => Ok(value),
            None => Err(self.failure(format!("{what} is None")).into()),
        }
    }

    /// Fails the step unless `items` is empty.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when there are items.
    #[track_caller]
    pub fn ensure_empty<T: Debug>(&self, items: &[T]) -> StepResult {
        self.check(items.is_empty(), || format!("{items:?} is not empty"))
    }

    /// Fails the step if `items` is empty.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when there is no item.
    #[track_caller]
    pub fn ensure_not_empty<T: Debug>(&self, items: &[T]) -> StepResult {
        self.check(!items.is_empty(), || format!("{items:?} is empty"))
    }

    /// Fails the step unless `items` has `len` items.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] on another length.
    #[track_caller]
    pub fn ensure_len<T: Debug>(&self, items: &[T], len: usize) -> StepResult {
        self.check(items.len() == len, || {
            format!("len({items:?}) is {}, not {len}", items.len())
        })
    }

    /// Fails the step unless `item` is one of `items`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `item` is missing.
    #[track_caller]
    pub fn ensure_contains<T: PartialEq + Debug>(&self, items: &[T], item: &T) -> StepResult {
        self.check(items.contains(item), || format!("{item:?} not in {items:?}"))
    }

    /// Fails the step if `item` is one of `items`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `item` is present.
    #[track_caller]
    pub fn ensure_not_contains<T: PartialEq + Debug>(&self, items: &[T], item: &T) -> StepResult {
        self.check(!items.contains(item), || format!("{item:?} in {items:?}"))
    }

    /// Fails the step unless `item` appears `count` times in `items`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] on another count.
    #[track_caller]
    pub fn ensure_count<T: PartialEq + Debug>(
        &self,
        items: &[T],
        item: &T,
        count: usize,
    ) -> StepResult {
        let found = items.iter().filter(|candidate| *candidate == item).count();
        self.check(found == count, || {
            format!("{items:?} should contain {count} count of {item:?} ({found} found)")
        })
    }

    /// Fails the step unless `text` starts with `prefix`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] otherwise.
    #[track_caller]
    pub fn ensure_starts_with(&self, text: &str, prefix: &str) -> StepResult {
        self.check(text.starts_with(prefix), || {
            format!("{text:?} does not start with {prefix:?}")
        })
    }

    /// Fails the step if `text` starts with `prefix`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] otherwise.
    #[track_caller]
    pub fn ensure_not_starts_with(&self, text: &str, prefix: &str) -> StepResult {
        self.check(!text.starts_with(prefix), || {
            format!("{text:?} should not start with {prefix:?}")
        })
    }

    /// Fails the step unless `text` ends with `suffix`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] otherwise.
    #[track_caller]
    pub fn ensure_ends_with(&self, text: &str, suffix: &str) -> StepResult {
        self.check(text.ends_with(suffix), || {
            format!("{text:?} does not end with {suffix:?}")
        })
    }

    /// Fails the step if `text` ends with `suffix`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] otherwise.
    #[track_caller]
    pub fn ensure_not_ends_with(&self, text: &str, suffix: &str) -> StepResult {
        self.check(!text.ends_with(suffix), || {
            format!("{text:?} should not end with {suffix:?}")
        })
    }

    /// Fails the step unless `regex` matches somewhere in `text`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when nothing matches.
    #[track_caller]
    pub fn ensure_match(&self, regex: &Regex, text: &str) -> StepResult {
        self.check(regex.is_match(text), || {
            format!("Regex did not match: {:?} not found in {text:?}", regex.as_str())
        })
    }

    /// Fails the step if `regex` matches somewhere in `text`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] on a match.
    #[track_caller]
    pub fn ensure_no_match(&self, regex: &Regex, text: &str) -> StepResult {
        match regex.find(text) {
            Some(found) => self.fail(format!(
                "Regex matched: {:?} found in {text:?}",
                found.as_str()
            )),
            None => Ok(()),
        }
    }

    // Step execution times.

    #[track_caller]
    fn last_execution(&self, spec: StepSpec) -> Result<(StepId, &StepExecution), StepBreak> {
        let store = self.session().store();
        let step = store
            .find_step(self.scenario(), &spec, false)
            .map_err(Error::from)?;
        match store[step].executions().last() {
            Some(execution) => Ok((step, execution)),
            None => Err(self
                .failure(format!("{} not executed", self.step_label(step)))
                .into()),
        }
    }

    #[track_caller]
    fn start_time(&self, step: StepId, execution: &StepExecution) -> Result<DateTime<Utc>, StepBreak> {
        match execution.time.start() {
            Some(start) => Ok(start),
            None => Err(self
                .failure(format!("{} not started", self.step_label(step)))
                .into()),
        }
    }

    #[track_caller]
    fn end_time(
        &self,
        step: StepId,
        execution: &StepExecution,
        expect_end_time: bool,
    ) -> Result<DateTime<Utc>, StepBreak> {
        match (execution.time.end(), expect_end_time) {
            (Some(end), _) => Ok(end),
            (None, false) => Ok(Utc::now()),
            (None, true) => Err(self
                .failure(format!("{} not terminated", self.step_label(step)))
                .into()),
        }
    }

    /// Fails the step unless `time` falls within the last execution of
    /// `step`.
    ///
    /// When `expect_end_time` is unset, a step still running ends now.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `time` is out of the execution, or when
    /// the step has not run. A fatal error if `step` matches nothing.
    #[track_caller]
    pub fn ensure_time_in_step(
        &self,
        time: DateTime<Utc>,
        step: impl Into<StepSpec>,
        expect_end_time: bool,
    ) -> StepResult {
        let (step, execution) = self.last_execution(step.into())?;
        let start = self.start_time(step, execution)?;
        let end = self.end_time(step, execution, expect_end_time)?;
        self.check(start <= time && time <= end, || {
            format!("{} not in {} {}", time.to_rfc3339(), self.step_label(step), execution.time)
        })
    }

    /// Fails the step unless `time` falls between the start of the last
    /// execution of `first` and the end of the last execution of `last`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `time` is out of the range, or when a
    /// step has not run. A fatal context error if `first` does not end
    /// before `last` starts.
    #[track_caller]
    pub fn ensure_time_in_steps(
        &self,
        time: DateTime<Utc>,
        first: impl Into<StepSpec>,
        last: impl Into<StepSpec>,
        expect_end_time: bool,
    ) -> StepResult {
        let (first, first_execution) = self.last_execution(first.into())?;
        let (last, last_execution) = self.last_execution(last.into())?;
        let start = self.start_time(first, first_execution)?;
        let first_end = self.end_time(first, first_execution, true)?;
        let last_start = self.start_time(last, last_execution)?;
        let end = self.end_time(last, last_execution, expect_end_time)?;
        if first_end >= last_start {
            return Err(self
                .context_error(&format!(
                    "ensure_time_in_steps(): {} {} should precede {} {}",
                    self.step_label(first),
                    first_execution.time,
                    self.step_label(last),
                    last_execution.time,
                ))
                .into());
        }
        self.check(start <= time && time <= end, || {
            format!(
                "{} not in {}->{} {}",
                time.to_rfc3339(),
                self.step_label(first),
                self.step_label(last),
                TimeStats::new(Some(start), Some(end)),
            )
        })
    }

    /// Fails the step unless `time` is strictly before the last execution
    /// of `step` started.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] otherwise, or when the step has not run.
    #[track_caller]
    pub fn ensure_time_before_step(&self, time: DateTime<Utc>, step: impl Into<StepSpec>) -> StepResult {
        let (step, execution) = self.last_execution(step.into())?;
        let start = self.start_time(step, execution)?;
        self.check(time < start, || {
            format!(
                "{} is not before {} {}",
                time.to_rfc3339(),
                self.step_label(step),
                execution.time
            )
        })
    }

    /// Fails the step unless `time` is strictly after the last execution of
    /// `step` ended.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] otherwise, or when the step has not run or
    /// not terminated.
    #[track_caller]
    pub fn ensure_time_after_step(&self, time: DateTime<Utc>, step: impl Into<StepSpec>) -> StepResult {
        let (step, execution) = self.last_execution(step.into())?;
        let end = self.end_time(step, execution, true)?;
        self.check(time > end, || {
            format!(
                "{} is not after {} {}",
                time.to_rfc3339(),
                self.step_label(step),
                execution.time
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use test_case::test_case;

    use super::*;
    use crate::{
        domain::{CodeLocation, ScenarioDefinition, StepDefinition, StepKind},
        engine::Session,
    };

    fn session_with_steps(count: u32) -> (Session, Vec<StepId>) {
        let mut session = Session::default();
        let scenario = session.store.insert_scenario(ScenarioDefinition::new(
            "checks",
            CodeLocation::new("checks.rs", 1, "checks"),
        ));
        let steps = (1..=count)
            .map(|index| {
                let name = format!("step{index:03}");
                let step = session.store.insert_step(StepDefinition::new(
                    name.clone(),
                    StepKind::Regular,
                    CodeLocation::new("checks.rs", index + 1, format!("checks::{name}")),
                ));
                session.store.add_step(scenario, step).unwrap();
                step
            })
            .collect();
        (session, steps)
    }

    fn failure_message(result: StepResult) -> Option<String> {
        match result {
            Ok(()) => None,
            Err(StepBreak::Failed(error)) => Some(error.message().to_string()),
            Err(other) => panic!("unexpected break: {other:?}"),
        }
    }

    fn check(assertion: impl FnOnce(&StepApi<'_>) -> StepResult) -> Option<String> {
        let (mut session, steps) = session_with_steps(1);
        let api = StepApi::new(&mut session, steps[0]);
        failure_message(assertion(&api))
    }

    #[test_case(|s| s.ensure_ne(1, 2), None ; "ne holds")]
    #[test_case(|s| s.ensure_ne(1, 1), Some("1 == 1") ; "ne fails")]
    #[test_case(|s| s.ensure_lt(1, 2), None ; "lt holds")]
    #[test_case(|s| s.ensure_lt(2, 2), Some("2 is not less than 2") ; "lt fails")]
    #[test_case(|s| s.ensure_le(2, 2), None ; "le holds")]
    #[test_case(|s| s.ensure_gt(3, 2), None ; "gt holds")]
    #[test_case(|s| s.ensure_gt(2, 2), Some("2 is not greater than 2") ; "gt fails")]
    #[test_case(|s| s.ensure_ge(1, 2), Some("1 is not greater than or equal to 2") ; "ge fails")]
    #[test_case(|s| s.ensure_strictly_between(1, 1, 3), Some("1 is not strictly between 1 and 3") ; "strictly between excludes bounds")]
    #[test_case(|s| s.ensure_between(1, 1, 3), None ; "between includes bounds")]
    #[test_case(|s| s.ensure_near(10.4, 10.0, 0.5), None ; "near holds")]
    #[test_case(|s| s.ensure_near(11.0, 10.0, 0.5), Some("11 is not near 10 (margin: 5.0% i.e. 0.5)") ; "near fails")]
    fn comparisons(assertion: fn(&StepApi<'_>) -> StepResult, expected: Option<&str>) {
        assert_eq!(check(assertion).as_deref(), expected);
    }

    #[test_case(|s| s.ensure_none::<u8>(None), None ; "none holds")]
    #[test_case(|s| s.ensure_none(Some(&3)), Some("Some(3) is not None") ; "none fails")]
    #[test_case(|s| s.ensure_some(Some(3), "value").map(|_| ()), None ; "some holds")]
    #[test_case(|s| s.ensure_some(None::<u8>, "value").map(|_| ()), Some("value is None") ; "some fails")]
    fn optional_values(assertion: fn(&StepApi<'_>) -> StepResult, expected: Option<&str>) {
        assert_eq!(check(assertion).as_deref(), expected);
    }

    #[test_case(|s| s.ensure_empty::<u8>(&[]), None ; "empty holds")]
    #[test_case(|s| s.ensure_empty(&[1]), Some("[1] is not empty") ; "empty fails")]
    #[test_case(|s| s.ensure_not_empty::<u8>(&[]), Some("[] is empty") ; "not empty fails")]
    #[test_case(|s| s.ensure_len(&[1, 2], 2), None ; "len holds")]
    #[test_case(|s| s.ensure_len(&[1, 2], 3), Some("len([1, 2]) is 2, not 3") ; "len fails")]
    #[test_case(|s| s.ensure_contains(&["a", "b"], &"b"), None ; "contains holds")]
    #[test_case(|s| s.ensure_contains(&["a"], &"b"), Some(r#""b" not in ["a"]"#) ; "contains fails")]
    #[test_case(|s| s.ensure_not_contains(&["a"], &"a"), Some(r#""a" in ["a"]"#) ; "not contains fails")]
    #[test_case(|s| s.ensure_count(&[1, 2, 1], &1, 2), None ; "count holds")]
    #[test_case(|s| s.ensure_count(&[1, 2, 1], &2, 2), Some("[1, 2, 1] should contain 2 count of 2 (1 found)") ; "count fails")]
    fn containers(assertion: fn(&StepApi<'_>) -> StepResult, expected: Option<&str>) {
        assert_eq!(check(assertion).as_deref(), expected);
    }

    #[test_case(|s| s.ensure_starts_with("scenario", "scen"), None ; "starts with holds")]
    #[test_case(|s| s.ensure_starts_with("scenario", "step"), Some(r#""scenario" does not start with "step""#) ; "starts with fails")]
    #[test_case(|s| s.ensure_not_starts_with("scenario", "scen"), Some(r#""scenario" should not start with "scen""#) ; "not starts with fails")]
    #[test_case(|s| s.ensure_ends_with("scenario", "rio"), None ; "ends with holds")]
    #[test_case(|s| s.ensure_not_ends_with("scenario", "step"), None ; "not ends with holds")]
    #[test_case(|s| s.ensure_match(&Regex::new(r"\d+").unwrap(), "step 42"), None ; "regex matches")]
    #[test_case(|s| s.ensure_match(&Regex::new(r"\d+").unwrap(), "none"), Some(r#"Regex did not match: "\\d+" not found in "none""#) ; "regex does not match")]
    #[test_case(|s| s.ensure_no_match(&Regex::new(r"\d+").unwrap(), "step 42"), Some(r#"Regex matched: "42" found in "step 42""#) ; "regex matches unexpectedly")]
    fn strings(assertion: fn(&StepApi<'_>) -> StepResult, expected: Option<&str>) {
        assert_eq!(check(assertion).as_deref(), expected);
    }

    #[test]
    fn failures_are_located_at_the_caller() {
        let (mut session, steps) = session_with_steps(1);
        let api = StepApi::new(&mut session, steps[0]);
        let line = line!() + 1;
        let Err(StepBreak::Failed(error)) = api.ensure_lt(2, 1) else {
            panic!("expected a failure");
        };
        let location = error.location().expect("located");
        assert_eq!(location.line(), line);
        assert_eq!(location.qualname(), "checks::step001");
        assert_eq!(failure_message(api.todo("later")).as_deref(), Some("TODO: later"));
    }

    fn at(base: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
        base + TimeDelta::seconds(seconds)
    }

    /// Two steps, run from +10s to +20s and from +30s to +40s; the third
    /// step started at +50s and is still running.
    fn timed_session(base: DateTime<Utc>) -> (Session, Vec<StepId>) {
        let (mut session, steps) = session_with_steps(4);
        for (number, (step, (start, end))) in steps
            .iter()
            .zip([(10, Some(20)), (30, Some(40)), (50, None)])
            .enumerate()
        {
            let mut execution = StepExecution::started(number + 1);
            execution.time = TimeStats::new(Some(at(base, start)), end.map(|end| at(base, end)));
            session.store[*step].executions_mut().push(execution);
        }
        (session, steps)
    }

    #[test_case(15, "step001", true ; "inside")]
    #[test_case(10, "step001", true ; "at the start")]
    #[test_case(20, "step001", true ; "at the end")]
    #[test_case(25, "step001", false ; "after")]
    #[test_case(5, "step001", false ; "before")]
    #[test_case(55, "step003", true ; "running step ends now")]
    fn time_in_step(offset: i64, step: &str, inside: bool) {
        let base = Utc::now() - TimeDelta::hours(1);
        let (mut session, steps) = timed_session(base);
        let api = StepApi::new(&mut session, steps[3]);
        let result = api.ensure_time_in_step(at(base, offset), step, false);
        assert_eq!(failure_message(result).is_none(), inside);
    }

    #[test]
    fn running_steps_fail_when_an_end_is_expected() {
        let base = Utc::now() - TimeDelta::hours(1);
        let (mut session, steps) = timed_session(base);
        let api = StepApi::new(&mut session, steps[3]);
        let message = failure_message(api.ensure_time_in_step(at(base, 55), "step003", true));
        assert_eq!(message.as_deref(), Some("step#3 (step003) not terminated"));
        let message = failure_message(api.ensure_time_in_step(at(base, 55), "step004", false));
        assert_eq!(message.as_deref(), Some("step#4 (step004) not executed"));
    }

    #[test]
    fn time_in_step_ranges() {
        let base = Utc::now() - TimeDelta::hours(1);
        let (mut session, steps) = timed_session(base);
        let api = StepApi::new(&mut session, steps[3]);

        assert!(api.ensure_time_in_steps(at(base, 25), "step001", "step002", true).is_ok());
        let message = failure_message(api.ensure_time_in_steps(at(base, 45), "step001", "step002", true));
        assert!(message.is_some_and(|m| m.contains("not in step#1 (step001)->step#2 (step002)")));
        assert!(matches!(
            api.ensure_time_in_steps(at(base, 25), "step002", "step001", true),
            Err(StepBreak::Fatal(error)) if matches!(*error, Error::Context(_))
        ));
    }

    #[test]
    fn time_before_and_after_steps() {
        let base = Utc::now() - TimeDelta::hours(1);
        let (mut session, steps) = timed_session(base);
        let api = StepApi::new(&mut session, steps[3]);

        assert!(api.ensure_time_before_step(at(base, 5), 1_usize).is_ok());
        assert!(api.ensure_time_before_step(at(base, 10), 1_usize).is_err());
        assert!(api.ensure_time_after_step(at(base, 41), "step002").is_ok());
        assert!(api.ensure_time_after_step(at(base, 40), "step002").is_err());
        assert!(matches!(
            api.ensure_time_after_step(at(base, 41), "missing"),
            Err(StepBreak::Fatal(error)) if matches!(*error, Error::StepLookup(_))
        ));
    }
}
