use ctp_compiler::field::ParseContext;
use ctp_compiler::{Profile, Scanner};
use ctp_explore::{CombinationMode, ResultChecker, TrialContext, TrialSpec};
use ctp_ir::defs::TrialDef;
use ctp_ir::diag::{ExceptionList, ResultCode, Severity};
use ctp_ir::domain::DomainTable;
use ctp_ir::flags::FlagTable;
use ctp_ir::provider::{SourceTable, StaticBaselines, StaticCurves};
use ctp_ir::types::{RamType, TargetInfo, ToleranceSettings};
use ctp_model::{BuildContext, SlaveRelations, SourceSet};

struct Fixture {
    domains: DomainTable,
    profile: Profile,
    sources: SourceSet,
    baselines: StaticBaselines,
    target: TargetInfo,
    tolerance: ToleranceSettings,
}

impl Fixture {
    fn new() -> Self {
        let domains = DomainTable::default();
        let flags = FlagTable::default();
        let names = SourceTable::default();
        let ctx = ParseContext {
            domains: &domains,
            flags: &flags,
            sources: &names,
        };
        let mut scanner = Scanner::new(ctx);
        let mut diags = ExceptionList::new();
        scanner
            .scan_source("trials.ctp", include_str!("fixtures/trials.ctp"), &mut diags)
            .unwrap();
        assert!(diags.is_empty(), "unexpected diagnostics: {diags}");
        let profile = scanner.into_profile();

        let curves = StaticCurves::new();
        let relations = SlaveRelations::default();
        let build = BuildContext {
            domains: &domains,
            flags: &flags,
            curves: &curves,
            relations: &relations,
        };
        let sources = SourceSet::build(&profile, &build, &mut diags);
        assert!(diags.is_empty());

        let baselines =
            StaticBaselines::from_json_str(include_str!("fixtures/baselines.json"), &domains)
                .unwrap();
        let target = TargetInfo {
            chip: "ga102".to_string(),
            ram_type: Some(RamType::Gddr6),
            ..Default::default()
        };
        Self {
            domains,
            profile,
            sources,
            baselines,
            target,
            tolerance: ToleranceSettings::default(),
        }
    }

    fn trial(&self, name: &str) -> &TrialDef {
        self.profile.trials().find(|t| t.name == name).unwrap()
    }

    fn resolve(&self, name: &str, diags: &mut ExceptionList) -> Option<TrialSpec> {
        let ctx = TrialContext {
            sources: &self.sources,
            baselines: &self.baselines,
            target: &self.target,
            tolerance: &self.tolerance,
        };
        TrialSpec::resolve(self.trial(name), &ctx, diags).unwrap()
    }
}

#[test]
fn test_end_clamped_to_last_iteration() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let sweep = fx.resolve("sweep", &mut diags).unwrap();
    assert!(diags.is_empty());
    assert_eq!(sweep.cardinality(), 12);
    assert_eq!((sweep.begin, sweep.end), (0, 11));

    let again = fx.resolve("sweep", &mut diags).unwrap();
    assert_eq!(again.end, sweep.end);
}

#[test]
fn test_begin_after_last_iteration_is_fatal() {
    let fx = Fixture::new();
    let ctx = TrialContext {
        sources: &fx.sources,
        baselines: &fx.baselines,
        target: &fx.target,
        tolerance: &fx.tolerance,
    };
    let mut diags = ExceptionList::new();
    let err = TrialSpec::resolve(fx.trial("late"), &ctx, &mut diags).unwrap_err();
    assert_eq!(err.severity, Severity::Fatal);
    assert!(err.message.contains("begin after last iteration"));
    assert!(err.message.contains("(100 > 49)"));
    assert_eq!(err.code, Some(ResultCode::IndexOutOfRange));
    assert!(diags.is_fatal());
    assert!(err.location.is_some());
}

#[test]
fn test_prefix_sum_locates_reference() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let sweep = fx.resolve("sweep", &mut diags).unwrap();
    assert_eq!(sweep.locate(0), Some((0, 0)));
    assert_eq!(sweep.locate(5), Some((0, 5)));
    assert_eq!(sweep.locate(7), Some((1, 1)));
    assert_eq!(sweep.locate(12), None);

    let gpc = fx.domains.lookup("gpc").unwrap();
    let sys = fx.domains.lookup("sys").unwrap();
    let target = sweep.target(7, &fx.sources, &mut diags).unwrap();
    assert!(target.is_valid());
    assert_eq!(target.freq(gpc), Some(1_350_000));
    assert_eq!(target.freq(sys), Some(990_000));
    assert_eq!(target.clock(gpc).source, Some(2));
}

#[test]
fn test_sequential_steps_cover_range() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let sweep = fx.resolve("sweep", &mut diags).unwrap();
    let steps: Vec<_> = sweep.steps(&fx.sources).collect();
    assert_eq!(steps.len(), 12);
    assert!(steps.iter().all(|s| s.is_runnable()));
    let indices: Vec<u64> = steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());

    let gpc = fx.domains.lookup("gpc").unwrap();
    let first = steps[0].target.as_ref().unwrap();
    assert_eq!(first.freq(gpc), Some(1_100_000));
}

#[test]
fn test_all_sine_reference_is_synchronized() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let synced = fx.resolve("synced", &mut diags).unwrap();
    assert_eq!(synced.references[0].mode, CombinationMode::Synchronized);
    assert_eq!(synced.cardinality(), 5);

    let sys = fx.domains.lookup("sys").unwrap();
    // ripple has three iterations; index 4 leaves sys at its baseline.
    let target = synced.target(4, &fx.sources, &mut diags).unwrap();
    assert!(diags.is_empty());
    assert_eq!(target.freq(sys), Some(1_000_000));
    let target = synced.target(2, &fx.sources, &mut diags).unwrap();
    let expected = 800_000.0 + 10_000.0 * (2.0f64).sin();
    assert_eq!(target.freq(sys), Some(expected.round() as u32));
}

#[test]
fn test_random_order_is_reproducible() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let shuffled = fx.resolve("shuffled", &mut diags).unwrap();
    assert_eq!(shuffled.references[0].mode, CombinationMode::Permuted);
    assert_eq!(shuffled.cardinality(), 30);

    let first: Vec<u64> = shuffled.steps(&fx.sources).map(|s| s.index).collect();
    let second: Vec<u64> = shuffled.steps(&fx.sources).map(|s| s.index).collect();
    assert_eq!(first.len(), 30);
    assert_eq!(first, second);
    assert!(first.iter().all(|&i| i < 30));
}

#[test]
fn test_pruned_domain_dropped_from_target() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let pruned = fx.resolve("pruned", &mut diags).unwrap();
    let gpc = fx.domains.lookup("gpc").unwrap();
    let sys = fx.domains.lookup("sys").unwrap();
    for step in pruned.steps(&fx.sources) {
        assert!(step.exceptions.is_empty());
        let target = step.target.unwrap();
        assert_eq!(target.freq(sys), None);
        assert!(target.freq(gpc).is_some());
    }
}

#[test]
fn test_ramtype_mismatch_skips_trial() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    assert!(fx.resolve("needs_hbm", &mut diags).is_none());
    assert_eq!(diags.severity(), Some(Severity::Unsupported));
    assert_eq!(diags.result_code(), Some(ResultCode::NotSupported));
}

#[test]
fn test_unresolvable_references_skip_trial() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    assert!(fx.resolve("ghost", &mut diags).is_none());
    assert_eq!(diags.count(Severity::Unsupported), 1);
    assert_eq!(diags.count(Severity::Error), 2);
    assert!(!diags.is_fatal());
}

#[test]
fn test_thresholds_follow_trial_tolerance() {
    let fx = Fixture::new();
    let mut diags = ExceptionList::new();
    let sweep = fx.resolve("sweep", &mut diags).unwrap();
    let target = sweep.target(0, &fx.sources, &mut diags).unwrap();
    let checker = ResultChecker::new(&fx.domains);
    let windows = checker.thresholds(&target, &sweep.tolerance);
    assert_eq!(windows.len(), 2);
    let json = serde_json::to_value(&windows).unwrap();
    assert_eq!(json[0]["low"], 1_078_000);
    assert_eq!(json[0]["high"], 1_122_000);
}

/// Offset table of 2^60 variations: ten clock columns of 64 values each.
fn wide_profile(trials: &str) -> String {
    let values: Vec<String> = (1..=64).map(|i| format!("+{i}")).collect();
    let values = values.join(", ");
    let mut text = String::from("name = wide\n");
    for domain in ["gpc", "sys", "xbar", "ltc", "nvd", "disp", "hub", "dram", "util", "pwr"] {
        text.push_str(&format!("{domain}.freq = {values}\n"));
    }
    text.push_str(trials);
    text
}

fn resolve_text(text: &str, trial: &str) -> (Option<TrialSpec>, ExceptionList) {
    let domains = DomainTable::default();
    let flags = FlagTable::default();
    let names = SourceTable::default();
    let ctx = ParseContext {
        domains: &domains,
        flags: &flags,
        sources: &names,
    };
    let mut scanner = Scanner::new(ctx);
    let mut diags = ExceptionList::new();
    scanner.scan_source("wide.ctp", text, &mut diags).unwrap();
    let profile = scanner.into_profile();

    let curves = StaticCurves::new();
    let relations = SlaveRelations::default();
    let build = BuildContext {
        domains: &domains,
        flags: &flags,
        curves: &curves,
        relations: &relations,
    };
    let sources = SourceSet::build(&profile, &build, &mut diags);
    assert!(diags.is_empty(), "unexpected diagnostics: {diags}");

    let baselines =
        StaticBaselines::from_json_str(include_str!("fixtures/baselines.json"), &domains).unwrap();
    let target = TargetInfo::default();
    let tolerance = ToleranceSettings::default();
    let ctx = TrialContext {
        sources: &sources,
        baselines: &baselines,
        target: &target,
        tolerance: &tolerance,
    };
    let def = profile.trials().find(|t| t.name == trial).unwrap();
    let spec = TrialSpec::resolve(def, &ctx, &mut diags).unwrap();
    (spec, diags)
}

#[test]
fn test_wide_table_resolves_exactly() {
    let (spec, diags) = resolve_text(&wide_profile("name = once\ntest = init:wide\n"), "once");
    assert!(diags.is_empty());
    assert_eq!(spec.unwrap().cardinality(), 1 << 60);
}

#[test]
fn test_overflowing_chain_rejected() {
    let (spec, diags) =
        resolve_text(&wide_profile("name = twice\ntest = init:wide:wide\n"), "twice");
    assert!(spec.is_none());
    assert!(!diags.is_fatal());
    let overflow = diags
        .iter()
        .find(|e| e.message.contains("variation count overflows"))
        .unwrap();
    assert_eq!(overflow.code, Some(ResultCode::InvalidArgument));
    assert_eq!(overflow.severity, Severity::Error);
}

#[test]
fn test_overflowing_trial_sum_rejected() {
    let tests = "test = init:wide\n".repeat(16);
    let (spec, diags) = resolve_text(&wide_profile(&format!("name = many\n{tests}")), "many");
    assert!(spec.is_none());
    assert_eq!(diags.len(), 1);
    assert_eq!(diags.result_code(), Some(ResultCode::InvalidArgument));
    assert!(diags.iter().next().unwrap().message.contains("trial 'many'"));
}
