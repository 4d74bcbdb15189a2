use ctp_ir::flags::FlagTable;
use ctp_ir::operator::{parse_magnitude, FlagOperator, NumericOperator, OperatorKind, ValueSpec};
use ctp_ir::units::{Dimension, FREQ_MAX_KHZ};

fn absolute(text: &str, dimension: Dimension) -> u32 {
    match NumericOperator::parse(text, dimension).unwrap().kind {
        OperatorKind::Absolute(value) => value,
        other => panic!("expected absolute operator for '{text}', got {other:?}"),
    }
}

#[test]
fn test_frequency_units_normalize_to_khz() {
    assert_eq!(absolute("1GHz", Dimension::Frequency), 1_000_000);
    assert_eq!(absolute("1000000KHz", Dimension::Frequency), 1_000_000);
    assert_eq!(absolute("1000MHz", Dimension::Frequency), 1_000_000);
    assert_eq!(absolute("1000000000Hz", Dimension::Frequency), 1_000_000);
    assert_eq!(absolute("1.5ghz", Dimension::Frequency), 1_500_000);
    assert_eq!(absolute("1000000", Dimension::Frequency), 1_000_000);
}

#[test]
fn test_voltage_units_normalize_to_microvolts() {
    assert_eq!(absolute("0.8V", Dimension::Voltage), 800_000);
    assert_eq!(absolute("800mV", Dimension::Voltage), 800_000);
    assert_eq!(absolute("800000uV", Dimension::Voltage), 800_000);
}

#[test]
fn test_display_reparses_to_same_value() {
    for text in ["1GHz", "+50MHz", "-125KHz", "750mV", "+10%", "-10%", "90%"] {
        let dimension = if text.ends_with("mV") {
            Dimension::Voltage
        } else {
            Dimension::Frequency
        };
        let op = NumericOperator::parse(text, dimension).unwrap();
        let again = NumericOperator::parse(&op.to_string(), dimension).unwrap();
        assert_eq!(op, again, "round trip of '{text}' via '{op}'");
    }
}

#[test]
fn test_percent_forms() {
    let prior = Some(1000);
    let up = NumericOperator::parse("+10%", Dimension::Frequency).unwrap();
    let down = NumericOperator::parse("-10%", Dimension::Frequency).unwrap();
    let same = NumericOperator::parse("+0%", Dimension::Frequency).unwrap();
    let ninety = NumericOperator::parse("90%", Dimension::Frequency).unwrap();
    assert_eq!(up.apply(prior).unwrap(), Some(1100));
    assert_eq!(down.apply(prior).unwrap(), Some(900));
    assert_eq!(same.apply(prior).unwrap(), Some(1000));
    assert_eq!(ninety.apply(prior).unwrap(), Some(900));
}

#[test]
fn test_unit_mismatch_rejected() {
    assert!(NumericOperator::parse("800mV", Dimension::Frequency).is_err());
    assert!(NumericOperator::parse("1GHz", Dimension::Voltage).is_err());
    assert!(NumericOperator::parse("5parsec", Dimension::Frequency).is_err());
    assert!(NumericOperator::parse("", Dimension::Frequency).is_err());
    assert!(NumericOperator::parse("1.2.3", Dimension::Frequency).is_err());
}

#[test]
fn test_absolute_above_max_is_out_of_range() {
    let op = NumericOperator::parse("200GHz", Dimension::Frequency).unwrap();
    assert_eq!(op.apply(None).unwrap(), None);
    let op = NumericOperator::absolute(Dimension::Frequency, FREQ_MAX_KHZ);
    assert_eq!(op.apply(None).unwrap(), Some(FREQ_MAX_KHZ));
}

#[test]
fn test_parse_magnitude_signed() {
    assert_eq!(parse_magnitude("-2MHz", Dimension::Frequency).unwrap(), -2000.0);
    assert!(parse_magnitude("5%", Dimension::Frequency).is_err());
}

#[test]
fn test_value_spec_with_flags() {
    let flags = FlagTable::default();
    let spec = ValueSpec::parse("+10%:ffr,-noramp", Dimension::Frequency, &flags).unwrap();
    let ffr = flags.lookup("ffr").unwrap();
    let noramp = flags.lookup("noramp").unwrap();
    assert_eq!(spec.flags.set, ffr);
    assert_eq!(spec.flags.clear, noramp);
    assert_eq!(spec.flags.apply(noramp), ffr);
    assert_eq!(spec.describe(&flags), "+10%:+ffr -noramp");
}

#[test]
fn test_flag_operator_unknown_flag() {
    let flags = FlagTable::default();
    assert!(FlagOperator::parse("ffr|warp", &flags).is_err());
    assert!(FlagOperator::parse("  ", &flags).is_err());
}
