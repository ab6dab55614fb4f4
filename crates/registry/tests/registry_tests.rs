use std::time::Duration;

use registry::{
    Category, DerivedExpr, DiscoveryMeta, Point, PointSource, ReadOp, RefreshPolicy, Registry,
    RegistryError, WriteOp,
};

fn every_second() -> RefreshPolicy {
    RefreshPolicy::Every(Duration::from_secs(1))
}

fn voltage(name: &str) -> Point {
    Point::sensor(name, ReadOp::scaled(0x101, 0.1), every_second(), DiscoveryMeta::named(name))
}

fn guard() -> Point {
    Point::new(
        "settings/write_guard",
        Category::Select,
        PointSource::Command { default: Some(types::Value::Text("disarmed".to_string())) },
        RefreshPolicy::Never,
        DiscoveryMeta::named("Write Guard").options(&["armed", "disarmed"]),
    )
    .writable(WriteOp::Arm {
        options: vec!["armed".to_string(), "disarmed".to_string()],
        armed: "armed".to_string(),
    })
}

#[test]
fn build_accepts_forward_declared_dependencies() {
    let points = vec![
        voltage("battery/voltage"),
        Point::sensor(
            "battery/current",
            ReadOp::scaled_signed(0x102, 0.1),
            every_second(),
            DiscoveryMeta::named("Battery Current"),
        ),
        Point::derived(
            "battery/power",
            DerivedExpr::product("battery/current", "battery/voltage"),
            every_second(),
            DiscoveryMeta::named("Battery Power"),
        ),
    ];

    let registry = Registry::build(points).expect("registry build");
    assert_eq!(registry.len(), 3);
    assert!(registry.get("battery/power").is_some());
    assert_eq!(registry.position("battery/voltage"), Some(0));
}

#[test]
fn build_rejects_duplicate_names() {
    let points = vec![voltage("battery/voltage"), voltage("battery/voltage")];
    let err = Registry::build(points).expect_err("duplicate must fail");
    assert!(matches!(err, RegistryError::DuplicatePoint(name) if name == "battery/voltage"));
}

#[test]
fn build_rejects_unknown_dependency() {
    let points = vec![Point::derived(
        "battery/power",
        DerivedExpr::product("battery/current", "battery/voltage"),
        every_second(),
        DiscoveryMeta::named("Battery Power"),
    )];
    let err = Registry::build(points).expect_err("unknown dep must fail");
    assert!(matches!(err, RegistryError::UnknownDependency { .. }));
}

#[test]
fn build_rejects_dependency_declared_later() {
    let points = vec![
        Point::derived(
            "battery/power",
            DerivedExpr::product("battery/current", "battery/voltage"),
            every_second(),
            DiscoveryMeta::named("Battery Power"),
        ),
        voltage("battery/voltage"),
        Point::sensor(
            "battery/current",
            ReadOp::scaled_signed(0x102, 0.1),
            every_second(),
            DiscoveryMeta::named("Battery Current"),
        ),
    ];
    let err = Registry::build(points).expect_err("forward dep must fail");
    assert!(matches!(err, RegistryError::ForwardDependency { .. }));
}

#[test]
fn build_rejects_self_reference() {
    let points = vec![Point::derived(
        "loop/total",
        DerivedExpr::sum(&["loop/total"]),
        every_second(),
        DiscoveryMeta::named("Loop"),
    )];
    let err = Registry::build(points).expect_err("cycle must fail");
    assert!(matches!(err, RegistryError::ForwardDependency { .. }));
}

#[test]
fn build_rejects_dangerous_point_without_writer() {
    let points = vec![voltage("battery/voltage").dangerous(), guard()];
    let err = Registry::build(points).expect_err("dangerous without writer");
    assert!(matches!(err, RegistryError::DangerousWithoutWriter(_)));
}

#[test]
fn build_rejects_dangerous_points_without_interlock() {
    let points = vec![Point::new(
        "device/reset",
        Category::Button,
        PointSource::Command { default: None },
        RefreshPolicy::Never,
        DiscoveryMeta::named("Reset"),
    )
    .writable(WriteOp::Trigger { register: 0xDF01, value: 1 })
    .dangerous()];
    let err = Registry::build(points).expect_err("missing interlock");
    assert!(matches!(err, RegistryError::MissingInterlock));
}

#[test]
fn build_records_interlock_and_armed_sentinel() {
    let points = vec![
        guard(),
        Point::new(
            "device/reset",
            Category::Button,
            PointSource::Command { default: None },
            RefreshPolicy::Never,
            DiscoveryMeta::named("Reset"),
        )
        .writable(WriteOp::Trigger { register: 0xDF01, value: 1 })
        .dangerous(),
    ];

    let registry = Registry::build(points).expect("registry build");
    let interlock = registry.interlock().expect("interlock present");
    assert_eq!(interlock.name, "settings/write_guard");
    assert_eq!(interlock.armed, "armed");
}

#[test]
fn disabled_points_are_excluded_from_enabled_iteration() {
    let points = vec![
        voltage("battery/voltage").enabled(false),
        voltage("grid/voltage"),
    ];
    let registry = Registry::build(points).expect("registry build");
    let enabled: Vec<&str> = registry
        .enabled_points()
        .map(|point| point.name.as_str())
        .collect();
    assert_eq!(enabled, vec!["grid/voltage"]);
}
