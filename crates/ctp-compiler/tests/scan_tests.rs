use ctp_compiler::field::ParseContext;
use ctp_compiler::{Profile, Scanner};
use ctp_ir::defs::{Definition, DefinitionKind};
use ctp_ir::diag::{ExceptionList, ResultCode, Severity};
use ctp_ir::domain::DomainTable;
use ctp_ir::flags::FlagTable;
use ctp_ir::operator::OperatorKind;
use ctp_ir::provider::SourceTable;
use ctp_ir::types::{ExecutionMode, OrderMode, RamType};
use ctp_ir::BaselineKey;

struct Tables {
    domains: DomainTable,
    flags: FlagTable,
    sources: SourceTable,
}

impl Tables {
    fn new() -> Self {
        Self {
            domains: DomainTable::default(),
            flags: FlagTable::default(),
            sources: SourceTable::default(),
        }
    }

    fn ctx(&self) -> ParseContext<'_> {
        ParseContext {
            domains: &self.domains,
            flags: &self.flags,
            sources: &self.sources,
        }
    }

    fn scan(&self, file: &str, text: &str) -> (Profile, ExceptionList) {
        let mut scanner = Scanner::new(self.ctx());
        let mut diags = ExceptionList::new();
        let _ = scanner.scan_source(file, text, &mut diags);
        (scanner.into_profile(), diags)
    }
}

#[test]
fn test_sweep_fixture_compiles() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("sweep.ctp", include_str!("fixtures/sweep.ctp"));
    assert!(diags.is_empty(), "unexpected diagnostics:\n{diags}");
    assert_eq!(profile.len(), 4);

    let gpc = tables.domains.lookup("gpc").unwrap();
    let sys = tables.domains.lookup("sys").unwrap();
    let logic = tables.domains.lookup("logic").unwrap();

    let Some(Definition::Offset(offsets)) = profile.get(DefinitionKind::Offset, "offsets") else {
        panic!("offsets missing");
    };
    assert_eq!(offsets.clocks[&gpc].values.len(), 2);
    assert_eq!(offsets.clocks[&sys].values.len(), 3);
    assert_eq!(offsets.clocks[&sys].overrides.source, Some(1));
    assert_eq!(
        offsets.clocks[&gpc].overrides.flags.clear,
        tables.flags.lookup("noramp").unwrap()
    );
    assert_eq!(offsets.volts[&logic][0].op.kind, OperatorKind::Additive(25_000));

    let Some(Definition::Sine(wobble)) = profile.get(DefinitionKind::Sine, "wobble") else {
        panic!("wobble missing");
    };
    assert_eq!(wobble.iterations, Some(20));
    assert_eq!(wobble.domains[&gpc].alpha, Some(1_000_000.0));
    assert_eq!(wobble.domains[&gpc].beta, Some(50_000.0));
    assert_eq!(wobble.domains[&gpc].omega, Some(0.5));

    let Some(Definition::Curve(vf)) = profile.get(DefinitionKind::Curve, "vf") else {
        panic!("vf missing");
    };
    assert_eq!(vf.curves[&gpc], BaselineKey::Init);
    assert_eq!(vf.overrides[&gpc].flags.set, tables.flags.lookup("ffr").unwrap());

    let trial = profile.trials().next().unwrap();
    assert_eq!(trial.name, "sweep");
    assert_eq!(trial.references, vec!["init:offsets", "1:offsets:wobble"]);
    assert_eq!(trial.order, OrderMode::Random);
    assert_eq!(trial.seed, Some(7));
    assert_eq!((trial.begin, trial.end), (Some(2), Some(40)));
    assert_eq!(trial.tolerance.freq_percent, Some(3.0));
    assert_eq!(trial.tolerance.per_domain[&gpc], 1.0);
    assert_eq!(trial.tolerance.volt_uv, Some(20_000));
    assert!(trial.enable.contains("pcie") && trial.enable.contains("vf"));
    assert_eq!(trial.ram_type, Some(RamType::Gddr6));
    assert_eq!(tables.domains.format(trial.prune), "xbar.ltc");
    assert_eq!(trial.mode, ExecutionMode::RmApi);
}

#[test]
fn test_ambiguous_block_produces_no_object() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("ambiguous.ctp", include_str!("fixtures/ambiguous.ctp"));

    assert_eq!(diags.len(), 1);
    let e = diags.iter().next().unwrap();
    assert_eq!(e.severity, Severity::Syntax);
    assert_eq!(e.code, Some(ResultCode::AmbiguousBlock));
    assert!(e.message.contains("ambiguous"));
    assert_eq!(e.location.as_ref().map(|l| l.line), Some(1));

    // Only the well-formed block that follows survives.
    assert_eq!(profile.len(), 1);
    assert_eq!(profile.definitions()[0].name(), "ok");
    assert_eq!(profile.trials().count(), 0);
}

#[test]
fn test_errors_are_collected_not_fatal() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("errors.ctp", include_str!("fixtures/errors.ctp"));

    assert!(!diags.is_fatal());
    assert_eq!(diags.count(Severity::Syntax), 5);
    assert_eq!(diags.count(Severity::Error), 1);
    assert_eq!(diags.severity(), Some(Severity::Error));
    assert_eq!(diags.result_code(), Some(ResultCode::InvalidArgument));

    assert_eq!(profile.len(), 1);
    let Some(Definition::Offset(broken)) = profile.get(DefinitionKind::Offset, "broken") else {
        panic!("first 'broken' should survive");
    };
    let gpc = tables.domains.lookup("gpc").unwrap();
    assert_eq!(broken.clocks[&gpc].values.len(), 1);
    assert!(broken.clocks[&gpc].overrides.source.is_none());
}

#[test]
fn test_every_diagnostic_has_a_location() {
    let tables = Tables::new();
    let (_, diags) = tables.scan("errors.ctp", include_str!("fixtures/errors.ctp"));
    for e in &diags {
        let location = e.location.as_ref().expect("diagnostic without location");
        assert_eq!(location.file, "errors.ctp");
        assert!(location.line > 0);
    }
}

#[test]
fn test_unnamed_trial_gets_location_name() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("anon.ctp", "test = init:a\norder = sequential\n");
    assert!(diags.is_empty());
    let trial = profile.trials().next().unwrap();
    assert_eq!(trial.name, "trial@anon.ctp:1");
}

#[test]
fn test_unnamed_offset_is_rejected() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("anon.ctp", "gpc.freq = 1GHz\n");
    assert!(profile.is_empty());
    assert_eq!(diags.severity(), Some(Severity::Syntax));
}

#[test]
fn test_dryrun_directive() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("d.ctp", "dryrun\nname = a\ngpc.freq = 1GHz\n");
    assert!(diags.is_empty());
    assert!(profile.dry_run);
    assert_eq!(profile.len(), 1);
}

#[test]
fn test_polymorphic_field_outside_its_kinds() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan("p.ctp", "name = t\ntest = init:a\ngpc.source = pll\n");
    assert_eq!(profile.trials().count(), 1);
    assert_eq!(diags.count(Severity::Syntax), 1);
    assert!(diags.iter().next().unwrap().message.contains("not valid in a trial block"));
}

#[test]
fn test_malformed_name_does_not_extend_previous_table() {
    let tables = Tables::new();
    let (profile, diags) = tables.scan(
        "p.ctp",
        "name = a\ngpc.freq = 1GHz\nname = second table\ngpc.freq = 2GHz, 3GHz\n",
    );
    let gpc = tables.domains.lookup("gpc").unwrap();
    let Some(Definition::Offset(a)) = profile.get(DefinitionKind::Offset, "a") else {
        panic!("table 'a' missing");
    };
    assert_eq!(a.clocks[&gpc].values.len(), 1);
    assert_eq!(profile.len(), 1);
    assert_eq!(diags.count(Severity::Syntax), 2);
    assert!(diags.iter().any(|e| e.message.contains("invalid name 'second table'")));
}
