//! The declarative point table for PowMr-style hybrid inverters.
//!
//! Register addresses follow the vendor's RS-485 map: P01 DC data
//! (0x1xx), P02 inverter data (0x2xx), P03 device control (0xDFxx),
//! P05/P07 settings (0xExxx) and daily statistics (0xF0xx). Feature
//! flags disable points for hardware the installation does not have;
//! disabled points stay in the table so topic names remain stable.

use registry::{
    Category, DerivedExpr, DiscoveryMeta, Point, PointSource, ReadOp, RefreshPolicy, WriteOp,
};
use types::Value;

use crate::config::{Features, Intervals};

const CHARGING_STATES: &[(u16, &str)] = &[
    (0, "Not Charging"),
    (1, "Quick Charge"),
    (2, "Constant Voltage Charge"),
    (4, "Float Charge"),
    (6, "Battery Activation"),
    (8, "Fully Charged"),
];

const MACHINE_STATES: &[(u16, &str)] = &[
    (0, "Initialization"),
    (1, "Standby"),
    (2, "AC Power Operation"),
    (3, "Inverter Operation"),
];

const CHARGING_SOURCE_PRIORITIES: &[(u16, &str)] = &[
    (0, "Solar First"),
    (1, "Utility First"),
    (2, "Solar And Utility Simultaneously"),
    (3, "Solar Only"),
];

const OUTPUT_PRIORITIES: &[(u16, &str)] =
    &[(0, "Solar First"), (1, "Utility First"), (2, "Solar/Battery/Utility")];

const BATTERY_PRIORITIES: &[(u16, &str)] = &[
    (0, "Standby"),
    (1, "Battery Discharge For Load"),
    (2, "Battery Discharge For Home"),
    (3, "Battery Discharge For Grid"),
];

const BATTERY_TYPES: &[(u16, &str)] = &[
    (0, "User Defined"),
    (1, "SLD"),
    (2, "FLD"),
    (3, "GEL"),
    (4, "LFP 14 Cells"),
    (5, "LFP 15 Cells"),
    (6, "LFP 16 Cells"),
    (7, "LFP 7 Cells"),
    (8, "LFP 8 Cells"),
    (9, "LFP 9 Cells"),
    (10, "Ternary Lithium 7 Cells"),
    (11, "Ternary Lithium 8 Cells"),
    (12, "Ternary Lithium 13 Cells"),
    (13, "Ternary Lithium 14 Cells"),
    (14, "No Battery"),
];

fn select_options(options: &[(u16, &str)]) -> Vec<(u16, String)> {
    options.iter().map(|(raw, label)| (*raw, label.to_string())).collect()
}

fn option_labels<'a>(options: &[(u16, &'a str)]) -> Vec<&'a str> {
    options.iter().map(|(_, label)| *label).collect()
}

/// A rate-scaled voltage setting: the register holds tenths of a volt
/// for a 12 V bank, multiplied up by the battery rate divisor.
fn voltage_setting(
    name: &str,
    register: u16,
    display: &str,
    min_12v: f64,
    max_12v: f64,
    battery_rate: f64,
    refresh: RefreshPolicy,
    enabled: bool,
) -> Point {
    Point::new(
        name,
        Category::Number,
        PointSource::Register(ReadOp::rate_scaled(register)),
        refresh,
        DiscoveryMeta::named(display)
            .unit("V")
            .device_class("voltage")
            .icon("mdi:ray-vertex")
            .entity_category("config")
            .range(min_12v * battery_rate, max_12v * battery_rate, 0.1),
    )
    .writable(WriteOp::Number {
        register,
        scale: 0.1,
        rate_scaled: true,
        min: min_12v * battery_rate,
        max: max_12v * battery_rate,
    })
    .enabled(enabled)
}

fn soc_setting(
    name: &str,
    register: u16,
    display: &str,
    refresh: RefreshPolicy,
    enabled: bool,
) -> Point {
    Point::new(
        name,
        Category::Number,
        PointSource::Register(ReadOp::integer(register)),
        refresh,
        DiscoveryMeta::named(display)
            .unit("%")
            .icon("mdi:battery")
            .entity_category("config")
            .range(0.0, 100.0, 1.0),
    )
    .writable(WriteOp::Number { register, scale: 1.0, rate_scaled: false, min: 0.0, max: 100.0 })
    .enabled(enabled)
}

fn dangerous_button(name: &str, display: &str, register: u16, value: u16) -> Point {
    Point::new(
        name,
        Category::Button,
        PointSource::Command { default: None },
        RefreshPolicy::Never,
        DiscoveryMeta::named(display)
            .icon("mdi:alert")
            .entity_category("config")
            .press_payload("PRESS"),
    )
    .writable(WriteOp::Trigger { register, value })
    .dangerous()
}

/// Builds the full table. Declaration order matters: derived points
/// must come after the points they read, and the scheduler polls in
/// this order.
pub fn default_points(
    features: &Features,
    intervals: &Intervals,
    battery_rate: f64,
) -> Vec<Point> {
    let system = features.system;
    let battery = features.battery;
    let phases = features.split_phase;
    let trackers = features.pv_trackers;

    let battery_every = RefreshPolicy::Every(intervals.battery);
    let pv_every = RefreshPolicy::Every(intervals.pv);
    let grid_every = RefreshPolicy::Every(intervals.grid);
    let inverter_every = RefreshPolicy::Every(intervals.inverter);
    let load_every = RefreshPolicy::Every(intervals.load);
    let statistics_every = RefreshPolicy::Every(intervals.statistics);
    let temperature_every = RefreshPolicy::Every(intervals.temperature);
    let general_every = RefreshPolicy::Every(intervals.general);

    let diag = |name: &str| {
        DiscoveryMeta::named(name).entity_category("diagnostic").icon("mdi:information")
    };

    let mut points = Vec::new();

    // system identity, read once at startup
    points.extend([
        Point::sensor("system/build_time", ReadOp::text(0x021, 10), RefreshPolicy::Once, diag("Build Time"))
            .enabled(system),
        Point::sensor("system/serial_number", ReadOp::text(0x035, 10), RefreshPolicy::Once, diag("Serial Number"))
            .enabled(system),
        Point::sensor("system/minor_version", ReadOp::integer(0x00A), RefreshPolicy::Once, diag("Minor Version"))
            .enabled(system),
        Point::sensor("system/app_version", ReadOp::version(0x014, 1, 0), RefreshPolicy::Once, diag("App Version"))
            .enabled(system),
        Point::sensor("system/bootloader_version", ReadOp::version(0x015, 1, 0), RefreshPolicy::Once, diag("Bootloader Version"))
            .enabled(system),
        Point::sensor("system/control_panel_version", ReadOp::version(0x016, 1, 0), RefreshPolicy::Once, diag("Control Panel Version"))
            .enabled(system),
        Point::sensor("system/power_amplifier_version", ReadOp::version(0x017, 1, 0), RefreshPolicy::Once, diag("Power Amplifier Version"))
            .enabled(system),
        Point::sensor("system/rs485_version", ReadOp::version(0x01C, 1, 0), RefreshPolicy::Once, diag("RS-485 Version"))
            .enabled(system),
        Point::sensor("system/rs485_address", ReadOp::integer(0x01A), RefreshPolicy::Once, diag("RS-485 Address"))
            .enabled(system),
        Point::sensor("system/model", ReadOp::integer(0x01B), RefreshPolicy::Once, diag("Model"))
            .enabled(system),
        Point::sensor("system/date_time", ReadOp::date_time(0x20C), general_every, diag("System Date/Time"))
            .enabled(system),
    ]);

    // battery telemetry
    points.extend([
        Point::sensor(
            "battery/soc",
            ReadOp::integer(0x100),
            battery_every,
            DiscoveryMeta::named("Battery SOC").unit("%").device_class("battery").icon("mdi:battery"),
        )
        .enabled(battery),
        Point::sensor(
            "battery/voltage",
            ReadOp::scaled(0x101, 0.1),
            battery_every,
            DiscoveryMeta::named("Battery Voltage").unit("V").device_class("voltage").icon("mdi:current-dc"),
        )
        .enabled(battery),
        Point::sensor(
            "battery/current",
            ReadOp::scaled_signed(0x102, 0.1),
            battery_every,
            DiscoveryMeta::named("Battery Current").unit("A").device_class("current").icon("mdi:current-ac"),
        )
        .enabled(battery),
        Point::derived(
            "battery/power",
            DerivedExpr::product("battery/current", "battery/voltage"),
            battery_every,
            DiscoveryMeta::named("Battery Power").unit("W").device_class("power").icon("mdi:flash"),
        )
        .enabled(battery),
        Point::sensor(
            "battery/temperature",
            ReadOp::scaled_signed(0x103, 0.1),
            battery_every,
            DiscoveryMeta::named("Battery Temperature").unit("°C").device_class("temperature").icon("mdi:thermometer"),
        )
        .enabled(battery),
        Point::sensor(
            "battery/charge_state",
            ReadOp::enumerated(0x10B, CHARGING_STATES),
            battery_every,
            DiscoveryMeta::named("Charge State").icon("mdi:information"),
        )
        .enabled(battery),
    ]);

    // PV trackers
    points.extend([
        Point::sensor(
            "pv1/voltage",
            ReadOp::scaled(0x107, 0.1),
            pv_every,
            DiscoveryMeta::named("PV1 Voltage").unit("V").device_class("voltage").icon("mdi:current-dc"),
        )
        .enabled(trackers >= 1),
        Point::sensor(
            "pv1/current",
            ReadOp::scaled(0x108, 0.1),
            pv_every,
            DiscoveryMeta::named("PV1 Current").unit("A").device_class("current").icon("mdi:current-ac"),
        )
        .enabled(trackers >= 1),
        Point::sensor(
            "pv1/power",
            ReadOp::integer(0x109),
            pv_every,
            DiscoveryMeta::named("PV1 Power").unit("W").device_class("power").icon("mdi:solar-power"),
        )
        .enabled(trackers >= 1),
        Point::sensor(
            "pv2/voltage",
            ReadOp::scaled(0x10F, 0.1),
            pv_every,
            DiscoveryMeta::named("PV2 Voltage").unit("V").device_class("voltage").icon("mdi:current-dc"),
        )
        .enabled(trackers >= 2),
        Point::sensor(
            "pv2/current",
            ReadOp::scaled(0x110, 0.1),
            pv_every,
            DiscoveryMeta::named("PV2 Current").unit("A").device_class("current").icon("mdi:current-ac"),
        )
        .enabled(trackers >= 2),
        Point::sensor(
            "pv2/power",
            ReadOp::integer(0x111),
            pv_every,
            DiscoveryMeta::named("PV2 Power").unit("W").device_class("power").icon("mdi:solar-power"),
        )
        .enabled(trackers >= 2),
        Point::sensor(
            "pv/power",
            ReadOp::integer(0x10A),
            pv_every,
            DiscoveryMeta::named("PV Total Power").unit("W").device_class("power").icon("mdi:solar-power"),
        )
        .enabled(trackers >= 1),
        Point::sensor(
            "pv/charging_current",
            ReadOp::scaled(0x224, 0.1),
            pv_every,
            DiscoveryMeta::named("PV Charging Current").unit("A").device_class("current").icon("mdi:current-ac"),
        )
        .enabled(trackers >= 1),
    ]);

    // grid side, per phase: CT power is signed (negative = import)
    let grid_phase: [(u8, &str, [u16; 5]); 3] = [
        (1, "a", [0x213, 0x214, 0x23A, 0x240, 0x23D]),
        (2, "b", [0x22A, 0x238, 0x23B, 0x241, 0x23E]),
        (3, "c", [0x22B, 0x239, 0x23C, 0x242, 0x23F]),
    ];
    for (minimum, phase, [voltage, current, ct_power, home_power, apparent]) in grid_phase {
        let on = phases >= minimum;
        let upper = phase.to_uppercase();
        points.extend([
            Point::sensor(
                &format!("grid/voltage_{phase}"),
                ReadOp::scaled(voltage, 0.1),
                grid_every,
                DiscoveryMeta::named(&format!("Grid Voltage {upper}")).unit("V").device_class("voltage").icon("mdi:flash-outline"),
            )
            .enabled(on),
            Point::sensor(
                &format!("grid/current_{phase}"),
                ReadOp::scaled(current, 0.1),
                grid_every,
                DiscoveryMeta::named(&format!("Grid Current {upper}")).unit("A").device_class("current").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::sensor(
                &format!("ct/power_{phase}"),
                ReadOp::integer_signed(ct_power),
                grid_every,
                DiscoveryMeta::named(&format!("CT Power {upper}")).unit("W").device_class("power").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::sensor(
                &format!("home/power_{phase}"),
                ReadOp::integer(home_power),
                grid_every,
                DiscoveryMeta::named(&format!("Home Load Power {upper}")).unit("W").device_class("power").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::sensor(
                &format!("grid/apparent_power_{phase}"),
                ReadOp::integer(apparent),
                grid_every,
                DiscoveryMeta::named(&format!("Grid Apparent Power {upper}")).unit("VA").device_class("apparent_power").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::derived(
                &format!("grid/power_{phase}"),
                DerivedExpr::difference(&format!("ct/power_{phase}"), &format!("home/power_{phase}")),
                grid_every,
                DiscoveryMeta::named(&format!("Grid Power {upper}")).unit("W").device_class("power").icon("mdi:flash"),
            )
            .enabled(on),
        ]);
    }
    points.extend([
        Point::sensor(
            "grid/frequency",
            ReadOp::scaled(0x215, 0.01),
            grid_every,
            DiscoveryMeta::named("Grid Frequency").unit("Hz").device_class("frequency").icon("mdi:pulse"),
        )
        .enabled(phases >= 1),
        Point::derived(
            "ct/power",
            DerivedExpr::sum(&["ct/power_a", "ct/power_b", "ct/power_c"]),
            inverter_every,
            DiscoveryMeta::named("CT Total Power").unit("W").device_class("power").icon("mdi:flash"),
        )
        .enabled(phases >= 1),
        Point::derived(
            "home/power",
            DerivedExpr::sum(&["home/power_a", "home/power_b", "home/power_c"]),
            inverter_every,
            DiscoveryMeta::named("Home Load Total Power").unit("W").device_class("power").icon("mdi:flash"),
        )
        .enabled(phases >= 1),
        Point::derived(
            "grid/apparent_power",
            DerivedExpr::sum(&["grid/apparent_power_a", "grid/apparent_power_b", "grid/apparent_power_c"]),
            inverter_every,
            DiscoveryMeta::named("Grid Total Apparent Power").unit("VA").device_class("apparent_power").icon("mdi:flash"),
        )
        .enabled(phases >= 1),
        Point::derived(
            "grid/power",
            DerivedExpr::sum(&["grid/power_a", "grid/power_b", "grid/power_c"]),
            inverter_every,
            DiscoveryMeta::named("Grid Total Power").unit("W").device_class("power").icon("mdi:flash"),
        )
        .enabled(phases >= 1),
    ]);

    // inverter diagnostics and AC output
    points.extend([
        Point::sensor("inverter/error", ReadOp::integer(0x200), inverter_every, diag("Inverter Error Flags").icon("mdi:alert-circle")),
        Point::sensor("inverter/failcode0", ReadOp::integer(0x204), inverter_every, diag("Fail Code 0").icon("mdi:alert-circle")),
        Point::sensor("inverter/failcode1", ReadOp::integer(0x205), inverter_every, diag("Fail Code 1").icon("mdi:alert-circle")),
        Point::sensor("inverter/failcode2", ReadOp::integer(0x206), inverter_every, diag("Fail Code 2").icon("mdi:alert-circle")),
        Point::sensor("inverter/failcode3", ReadOp::integer(0x207), inverter_every, diag("Fail Code 3").icon("mdi:alert-circle")),
        Point::sensor("inverter/grid_on_remain_time", ReadOp::integer(0x20F), inverter_every, DiscoveryMeta::named("Remaining Grid On Time").icon("mdi:information")),
        Point::sensor(
            "inverter/state",
            ReadOp::enumerated(0x210, MACHINE_STATES),
            inverter_every,
            DiscoveryMeta::named("Inverter State").icon("mdi:information"),
        ),
        Point::sensor(
            "inverter/charging_power",
            ReadOp::integer(0x10E),
            inverter_every,
            DiscoveryMeta::named("Charging Power").unit("W").device_class("power").icon("mdi:battery-charging"),
        ),
        Point::sensor(
            "inverter/bus_voltage",
            ReadOp::scaled(0x212, 0.1),
            inverter_every,
            DiscoveryMeta::named("Bus Voltage").unit("V").device_class("voltage").icon("mdi:flash-outline"),
        ),
        Point::sensor(
            "inverter/pbus_voltage",
            ReadOp::scaled(0x228, 0.1),
            inverter_every,
            DiscoveryMeta::named("PBus Voltage").unit("V").device_class("voltage").icon("mdi:flash-outline"),
        ),
        Point::sensor(
            "inverter/nbus_voltage",
            ReadOp::scaled(0x229, 0.1),
            inverter_every,
            DiscoveryMeta::named("NBus Voltage").unit("V").device_class("voltage").icon("mdi:flash-outline"),
        ),
        Point::sensor(
            "inverter/frequency",
            ReadOp::scaled(0x218, 0.01),
            inverter_every,
            DiscoveryMeta::named("Inverter Frequency").unit("Hz").device_class("frequency").icon("mdi:sine-wave"),
        )
        .enabled(phases >= 1),
        Point::sensor(
            "inverter/parallel_current",
            ReadOp::scaled(0x225, 0.1),
            inverter_every,
            DiscoveryMeta::named("Parallel Load Avg Current").unit("A").device_class("current").icon("mdi:current-ac"),
        ),
    ]);

    let inverter_phase: [(u8, &str, u16, u16); 3] = [
        (1, "a", 0x216, 0x217),
        (2, "b", 0x22C, 0x22E),
        (3, "c", 0x22D, 0x22F),
    ];
    for (minimum, phase, voltage, current) in inverter_phase {
        let on = phases >= minimum;
        let upper = phase.to_uppercase();
        points.extend([
            Point::sensor(
                &format!("inverter/voltage_{phase}"),
                ReadOp::scaled(voltage, 0.1),
                inverter_every,
                DiscoveryMeta::named(&format!("Inverter Voltage {upper}")).unit("V").device_class("voltage").icon("mdi:lightning-bolt"),
            )
            .enabled(on),
            Point::sensor(
                &format!("inverter/current_{phase}"),
                ReadOp::scaled(current, 0.1),
                inverter_every,
                DiscoveryMeta::named(&format!("Inverter Current {upper}")).unit("A").device_class("current").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::derived(
                &format!("inverter/apparent_power_{phase}"),
                DerivedExpr::product(
                    &format!("inverter/voltage_{phase}"),
                    &format!("inverter/current_{phase}"),
                ),
                inverter_every,
                DiscoveryMeta::named(&format!("Inverter Apparent Power {upper}")).unit("VA").device_class("apparent_power").icon("mdi:flash"),
            )
            .enabled(on),
        ]);
    }
    points.push(
        Point::derived(
            "inverter/apparent_power",
            DerivedExpr::sum(&[
                "inverter/apparent_power_a",
                "inverter/apparent_power_b",
                "inverter/apparent_power_c",
            ]),
            inverter_every,
            DiscoveryMeta::named("Inverter Total Apparent Power").unit("VA").device_class("apparent_power").icon("mdi:flash"),
        )
        .enabled(phases >= 1),
    );

    // load side
    let load_phase: [(u8, &str, u16, u16, u16); 3] = [
        (1, "a", 0x219, 0x21B, 0x21F),
        (2, "b", 0x230, 0x232, 0x236),
        (3, "c", 0x231, 0x233, 0x237),
    ];
    for (minimum, phase, current, power, ratio) in load_phase {
        let on = phases >= minimum;
        let upper = phase.to_uppercase();
        points.extend([
            Point::sensor(
                &format!("load/current_{phase}"),
                ReadOp::scaled(current, 0.1),
                load_every,
                DiscoveryMeta::named(&format!("Load Current {upper}")).unit("A").device_class("current").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::sensor(
                &format!("load/power_{phase}"),
                ReadOp::integer(power),
                load_every,
                DiscoveryMeta::named(&format!("Load Power {upper}")).unit("W").device_class("power").icon("mdi:current-ac"),
            )
            .enabled(on),
            Point::sensor(
                &format!("load/ratio_{phase}"),
                ReadOp::integer(ratio),
                load_every,
                DiscoveryMeta::named(&format!("Load Ratio {upper}")).unit("%").icon("mdi:current-ac"),
            )
            .enabled(on),
        ]);
    }
    points.extend([
        Point::derived(
            "load/power",
            DerivedExpr::sum(&["load/power_a", "load/power_b", "load/power_c"]),
            load_every,
            DiscoveryMeta::named("Load Total Power").unit("W").device_class("power").icon("mdi:flash"),
        )
        .enabled(phases >= 1),
        Point::sensor(
            "load/grid_charging_current",
            ReadOp::scaled(0x21E, 0.1),
            load_every,
            DiscoveryMeta::named("Grid Charging Current").unit("A").device_class("current").icon("mdi:current-ac"),
        )
        .enabled(phases >= 1),
    ]);

    // temperatures
    points.extend([
        Point::sensor(
            "temperature/dc_dc",
            ReadOp::scaled_signed(0x220, 0.1),
            temperature_every,
            DiscoveryMeta::named("Temperature DC-DC").unit("°C").device_class("temperature").icon("mdi:thermometer"),
        ),
        Point::sensor(
            "temperature/dc_ac",
            ReadOp::scaled_signed(0x221, 0.1),
            temperature_every,
            DiscoveryMeta::named("Temperature DC-AC").unit("°C").device_class("temperature").icon("mdi:thermometer"),
        ),
        Point::sensor(
            "temperature/transformer",
            ReadOp::scaled_signed(0x222, 0.1),
            temperature_every,
            DiscoveryMeta::named("Temperature Transformer").unit("°C").device_class("temperature").icon("mdi:thermometer"),
        ),
        Point::sensor(
            "temperature/ambient",
            ReadOp::scaled_signed(0x223, 0.1),
            temperature_every,
            DiscoveryMeta::named("Temperature Ambient").unit("°C").device_class("temperature").icon("mdi:thermometer"),
        )
        .enabled(features.ambient_temperature),
    ]);

    // daily statistics
    let energy = |name: &str| {
        DiscoveryMeta::named(name).unit("kWh").device_class("energy").state_class("total_increasing").icon("mdi:chart-bar")
    };
    let amp_hours = |name: &str| {
        DiscoveryMeta::named(name).unit("Ah").state_class("total_increasing").icon("mdi:chart-bar")
    };
    points.extend([
        Point::sensor("statistics/daily_generated_energy_to_grid", ReadOp::scaled(0xF02C, 0.1), statistics_every, energy("Daily Generated Energy To Grid")),
        Point::sensor("statistics/daily_battery_charged", ReadOp::integer(0xF02D), statistics_every, amp_hours("Daily Battery Charged")),
        Point::sensor("statistics/daily_battery_discharged", ReadOp::integer(0xF02E), statistics_every, amp_hours("Daily Battery Discharged")),
        Point::sensor("statistics/daily_pv_production", ReadOp::scaled(0xF02F, 0.1), statistics_every, energy("Daily PV Power Generated")),
        Point::sensor("statistics/daily_load_consumed", ReadOp::scaled(0xF030, 0.1), statistics_every, energy("Daily Load Consumed")),
        Point::sensor("statistics/daily_grid_charged", ReadOp::integer(0xF03C), statistics_every, amp_hours("Daily Grid Battery Charging")),
        Point::sensor("statistics/daily_grid_consumed", ReadOp::scaled(0xF03D, 0.1), statistics_every, energy("Daily Grid Consumed")),
    ]);

    // charging parameter settings; the current limit write invalidates
    // dependent readings, so it forces a full refresh pass
    points.push(
        Point::new(
            "charging/current_limit",
            Category::Number,
            PointSource::Register(ReadOp::scaled(0xE001, 0.1)),
            battery_every,
            DiscoveryMeta::named("Current Limit For Charging")
                .unit("A")
                .device_class("current")
                .icon("mdi:ray-vertex")
                .entity_category("config")
                .range(0.0, 200.0, 0.1),
        )
        .writable(WriteOp::Number { register: 0xE001, scale: 0.1, rate_scaled: false, min: 0.0, max: 200.0 })
        .with_full_refresh()
        .enabled(trackers >= 1),
    );
    points.extend([
        voltage_setting("charging/voltage_limit", 0xE006, "Battery Overvoltage Protection Limit", 9.0, 14.6, battery_rate, battery_every, battery),
        voltage_setting("charging/float_voltage", 0xE009, "Battery Float Charge Voltage", 9.0, 15.5, battery_rate, battery_every, battery),
        voltage_setting("charging/overdischarge_return_voltage", 0xE00B, "Battery Back From Overdischarge Voltage", 9.0, 15.5, battery_rate, battery_every, battery),
        voltage_setting("charging/undervoltage_warning_voltage", 0xE00C, "Battery Undervoltage Warning", 9.0, 15.5, battery_rate, battery_every, battery),
        voltage_setting("charging/discharge_limit_voltage", 0xE00E, "Battery Discharge Limit", 9.0, 15.5, battery_rate, battery_every, battery),
        soc_setting("charging/stop_discharge_soc_limit", 0xE00F, "Battery SOC Discharge Cutoff", battery_every, battery),
        soc_setting("charging/stop_grid_discharge_soc_limit", 0xE01F, "Stop Load/Home Discharge Battery SOC", battery_every, battery),
        soc_setting("charging/restart_grid_discharge_soc_limit", 0xE020, "Restart Load/Home Discharge Battery SOC", battery_every, battery),
        soc_setting("charging/stop_charging_soc_limit", 0xE01D, "Battery SOC Stop Charging", battery_every, battery),
        Point::new(
            "charging/total_charging_current_limit",
            Category::Number,
            PointSource::Register(ReadOp::scaled(0xE20A, 0.1)),
            battery_every,
            DiscoveryMeta::named("Battery Total Charging Current Limit")
                .unit("A")
                .device_class("current")
                .icon("mdi:current-ac")
                .entity_category("config")
                .range(0.0, 200.0, 0.1),
        )
        .writable(WriteOp::Number { register: 0xE20A, scale: 0.1, rate_scaled: false, min: 0.0, max: 200.0 })
        .enabled(battery),
    ]);

    // mode selects
    points.extend([
        Point::new(
            "charging/source_priority",
            Category::Select,
            PointSource::Register(ReadOp::enumerated(0xE20F, CHARGING_SOURCE_PRIORITIES)),
            general_every,
            DiscoveryMeta::named("Charging Source Priority")
                .icon("mdi:import")
                .options(&option_labels(CHARGING_SOURCE_PRIORITIES)),
        )
        .writable(WriteOp::Select {
            register: 0xE20F,
            options: select_options(CHARGING_SOURCE_PRIORITIES),
        })
        .with_full_refresh(),
        Point::new(
            "inverter/output_priority",
            Category::Select,
            PointSource::Register(ReadOp::enumerated(0xE204, OUTPUT_PRIORITIES)),
            general_every,
            DiscoveryMeta::named("Output Priority")
                .icon("mdi:export")
                .options(&option_labels(OUTPUT_PRIORITIES)),
        )
        .writable(WriteOp::Select { register: 0xE204, options: select_options(OUTPUT_PRIORITIES) })
        .with_full_refresh(),
        Point::new(
            "inverter/battery_priority",
            Category::Select,
            PointSource::Register(ReadOp::enumerated(0xE42A, BATTERY_PRIORITIES)),
            general_every,
            DiscoveryMeta::named("Battery State Priority")
                .icon("mdi:export")
                .options(&option_labels(BATTERY_PRIORITIES)),
        )
        .writable(WriteOp::Select { register: 0xE42A, options: select_options(BATTERY_PRIORITIES) })
        .with_full_refresh(),
        Point::new(
            "settings/battery_type",
            Category::Select,
            PointSource::Register(ReadOp::enumerated(0xE004, BATTERY_TYPES)),
            general_every,
            DiscoveryMeta::named("Battery Type")
                .icon("mdi:battery")
                .entity_category("config")
                .options(&option_labels(BATTERY_TYPES)),
        )
        .writable(WriteOp::Select { register: 0xE004, options: select_options(BATTERY_TYPES) })
        .enabled(battery),
    ]);

    // switches
    points.extend([
        Point::new(
            "inverter/power_saving",
            Category::Switch,
            PointSource::Register(ReadOp::integer(0xE20C)),
            general_every,
            DiscoveryMeta::named("Power Saving").icon("mdi:leaf").switch_payloads("1", "0"),
        )
        .writable(WriteOp::Switch { register: 0xE20C }),
        Point::new(
            "inverter/power",
            Category::Switch,
            PointSource::Command { default: None },
            RefreshPolicy::Never,
            DiscoveryMeta::named("Inverter Power").icon("mdi:power").switch_payloads("1", "0"),
        )
        .writable(WriteOp::Switch { register: 0xDF00 })
        .dangerous(),
    ]);

    // the write guard plus the controls it protects
    points.push(
        Point::new(
            "settings/write_guard",
            Category::Select,
            PointSource::Command { default: Some(Value::Text("disarmed".to_string())) },
            RefreshPolicy::Never,
            DiscoveryMeta::named("Write Guard")
                .icon("mdi:shield-lock")
                .entity_category("config")
                .options(&["armed", "disarmed"]),
        )
        .writable(WriteOp::Arm {
            options: vec!["armed".to_string(), "disarmed".to_string()],
            armed: "armed".to_string(),
        }),
    );
    points.extend([
        dangerous_button("device/reset", "Reset", 0xDF01, 1),
        dangerous_button("device/restore_factory_settings", "Restore Factory Settings", 0xDF02, 0xAA),
        dangerous_button("device/clear_statistics", "Clear Statistics", 0xDF02, 0xBB),
        dangerous_button("device/clear_errors", "Clear Errors", 0xDF02, 0xCC),
        dangerous_button("battery/equalize_now", "Equalize Battery Now", 0xDF0D, 1),
    ]);

    points
}
