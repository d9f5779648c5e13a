/// Metric name and help text for one field of the published snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub metric: &'static str,
    pub help: &'static str,
}

pub const CURRENT_RPM: Tag = Tag {
    metric: "spindle_current_rpm",
    help: "Commanded spindle speed after ramping",
};

pub const TARGET_RPM: Tag = Tag {
    metric: "spindle_target_rpm",
    help: "Requested spindle speed",
};

pub const DUTY: Tag = Tag {
    metric: "spindle_duty_percent",
    help: "Duty written to the ESC, percent of period",
};

pub const OUTPUT_LEVEL: Tag = Tag {
    metric: "spindle_output_level",
    help: "Fraction written to the PWM pin, inversion applied",
};

pub const SPINDLE_ON: Tag = Tag {
    metric: "spindle_on",
    help: "Spindle run state (1=on, 0=off)",
};

pub const MANUAL_OVERRIDE: Tag = Tag {
    metric: "spindle_manual_override",
    help: "Manual duty override active (1=manual, 0=ramp)",
};

pub const WAITING: Tag = Tag {
    metric: "spindle_waiting",
    help: "A command is blocked waiting for speed (1=waiting)",
};

/// Every exported snapshot field.
pub const ALL: [Tag; 7] = [
    CURRENT_RPM,
    TARGET_RPM,
    DUTY,
    OUTPUT_LEVEL,
    SPINDLE_ON,
    MANUAL_OVERRIDE,
    WAITING,
];
