use clap::Parser;
use pantheon_core::cli::Cli;
use pantheon_core::settings::Settings;
use pantheon_hal::{FakeHal, Operation};
use pantheon_installer::{exit_code, run};
use pantheon_workflow::guard::ScriptedAnswers;
use pantheon_workflow::stage_runner::ProvisionState;
use std::path::PathBuf;

fn cli(host: &str) -> Cli {
    Cli::try_parse_from(["pantheon", host]).unwrap()
}

fn settings() -> Settings {
    Settings::from_lookup(|_| None, PathBuf::from("/opt/pantheon")).unwrap()
}

fn live_hal() -> FakeHal {
    let hal = FakeHal::new();
    hal.add_file("/etc/pacman.conf", "[options]\n");
    hal.set_stdout("genfstab", "UUID=aaaa\t/\tbtrfs\trw,subvolid=256,subvol=/@\t0 0\n");
    hal
}

#[test]
fn unprivileged_run_exits_before_any_operation() {
    let hal = live_hal();
    hal.set_root(false);
    let err = run(
        &cli("THEMIS"),
        &hal,
        &settings(),
        ScriptedAnswers::default(),
        &|_| {},
    )
    .unwrap_err();
    assert_eq!(exit_code(&err), 3);
    assert_eq!(hal.operation_count(), 0);
}

#[test]
fn unknown_host_is_a_configuration_error() {
    let hal = live_hal();
    let err = run(&cli("MARS"), &hal, &settings(), ScriptedAnswers::default(), &|_| {})
        .unwrap_err();
    assert_eq!(exit_code(&err), 2);
    assert!(format!("{err:#}").contains("MARS"));
    assert_eq!(hal.operation_count(), 0);
}

#[test]
fn themis_provisions_end_to_end() {
    let hal = live_hal();
    let answers = ScriptedAnswers::new(["DESTROY THEMIS", "DESTROY THEMIS"]);
    let state = run(&cli("THEMIS"), &hal, &settings(), answers, &|_| {}).unwrap();
    assert_eq!(state, ProvisionState::Done);
    assert!(hal.has_operation(|op| matches!(
        op,
        Operation::Interactive { program, .. } if program == "arch-chroot"
    )));
}

#[test]
fn operator_abort_maps_to_its_own_exit_code() {
    let hal = live_hal();
    let answers = ScriptedAnswers::new(["no"]);
    let err = run(&cli("APOLLO"), &hal, &settings(), answers, &|_| {}).unwrap_err();
    assert_eq!(exit_code(&err), 5);
    assert!(!hal.has_operation(|op| matches!(op, Operation::NvmeFormat { .. })));
}

#[test]
fn unreachable_network_maps_to_its_own_exit_code() {
    let hal = live_hal();
    hal.fail_on("ping", None);
    let err = run(
        &cli("HEPHAESTUS"),
        &hal,
        &settings(),
        ScriptedAnswers::default(),
        &|_| {},
    )
    .unwrap_err();
    assert_eq!(exit_code(&err), 4);
}

#[test]
fn failed_subprocess_maps_to_its_own_exit_code() {
    let hal = live_hal();
    hal.fail_on("pacstrap", None);
    let answers = ScriptedAnswers::new(["DESTROY HEPHAESTUS"]);
    let err = run(&cli("HEPHAESTUS"), &hal, &settings(), answers, &|_| {}).unwrap_err();
    assert_eq!(exit_code(&err), 6);
    assert!(format!("{err:#}").contains("pacstrap"));
}
