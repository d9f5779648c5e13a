#[cfg(test)]
mod proptest_ramp {
    use crate::ramp::*;
    use proptest::prelude::*;

    fn band() -> DutyMap {
        DutyMap::default()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // One linear tick moves by min(step, |target - current|) and never overshoots
        #[test]
        fn linear_step_is_bounded(
            current in -20_000.0f64..=20_000.0,
            target in -20_000.0f64..=20_000.0,
            step_rpm in 0.1f64..=1_000.0,
        ) {
            let next = RampPolicy::Linear { step_rpm }.next_rpm(current, target);
            let expected = step_rpm.min((target - current).abs());
            let moved = (next - current).abs();

            prop_assert!((moved - expected).abs() <= 1e-9 * (1.0 + current.abs()),
                "moved {} expected {} (current={}, target={})", moved, expected, current, target);
            if current < target {
                prop_assert!(next <= target && next >= current);
            } else {
                prop_assert!(next >= target && next <= current);
            }
        }

        // Smoothing is monotone toward the target and gets within epsilon in finite ticks
        #[test]
        fn smoothing_converges_monotonically(
            current in -50_000.0f64..=50_000.0,
            target in 0.0f64..=50_000.0,
            decay in 0.01f64..=1.0,
        ) {
            let policy = RampPolicy::Smoothing { decay };
            let epsilon = 1e-3;
            let mut rpm = current;
            let mut ticks = 0u32;

            while (rpm - target).abs() > epsilon {
                let next = policy.next_rpm(rpm, target);
                prop_assert!((next - target).abs() <= (rpm - target).abs(),
                    "moved away from target: {} -> {} (target {})", rpm, next, target);
                if rpm < target {
                    prop_assert!(next <= target, "overshoot {} past {}", next, target);
                } else {
                    prop_assert!(next >= target, "overshoot {} past {}", next, target);
                }
                rpm = next;
                ticks += 1;
                prop_assert!(ticks < 10_000, "no convergence after {} ticks", ticks);
            }
        }

        // Zero speed is off whatever the coefficients
        #[test]
        fn zero_rpm_is_always_off(
            scale_a in -100.0f64..=100.0,
            scale_b in -100.0f64..=100.0,
        ) {
            let map = DutyMap { scale_a, scale_b, ..band() };
            prop_assert_eq!(map.duty_for(0.0), DUTY_OFF);
        }

        // Every computed duty is either off or inside the servo band
        #[test]
        fn duty_stays_in_band(
            rpm in prop::num::f64::ANY,
            scale_a in -10.0f64..=10.0,
            scale_b in -10.0f64..=10.0,
        ) {
            let map = DutyMap { scale_a, scale_b, ..band() };
            let duty = map.duty_for(rpm);
            prop_assert!(duty == DUTY_OFF || map.in_band(duty),
                "duty {} out of band for rpm {}", duty, rpm);
        }

        #[test]
        fn inversion_round_trips(fraction in 0.0f64..=1.0) {
            let back = apply_inversion(apply_inversion(fraction));
            prop_assert!((back - fraction).abs() <= f64::EPSILON);
        }
    }
}
