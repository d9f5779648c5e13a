pub mod clock;
pub mod config;
pub mod control_loop;
pub mod controller;
pub mod pwm;
pub mod pwm_sim;
pub mod ramp;
mod ramp_proptest;
pub mod report;
pub mod sync;
pub mod tags;
pub mod wait;

pub use clock::{TickRate, Ticker, TimeBase};
pub use config::{ConfigError, RampMode, ResolvedConfig, SpindleConfig};
pub use control_loop::{SpindleLoop, TickStats};
pub use controller::SpindleController;
pub use pwm::{OutputStats, PinSpec, PwmOutput};
pub use pwm_sim::SimulatedEsc;
pub use ramp::{DutyMap, RampConfig, RampPolicy, RampStep, DUTY_OFF};
pub use report::{SettingsReport, SpeedReport};
pub use sync::{ControlRequest, OutputMode, SpindleExchange, SpindleSnapshot};
pub use wait::{HaltSignal, IdleHook, SleepIdle, WaitOutcome, WaitPolicy};
