//! Crash-loop detection
//!
//! Counts consecutive watchdog resets. When more than the configured number
//! happen inside the window, the operator is asked where to boot instead of
//! booting the same crashing image again.

use verdict_api::{BootTarget, EfiTime};

use crate::context::PlatformContext;
use crate::vars;

const SECONDS_PER_DAY: i64 = 24 * 3600;
const DAYS_PER_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

pub fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Seconds since 1970-01-01 00:00:00, ignoring the time zone
pub fn efi_time_to_epoch(time: &EfiTime) -> i64 {
    let year = time.year as i64;
    let mut days: i64 = (1970..year)
        .map(|y| if is_leap_year(y) { 366 } else { 365 })
        .sum();

    let month = (time.month as usize).clamp(1, 12);
    for (index, len) in DAYS_PER_MONTH.iter().enumerate().take(month - 1) {
        days += len;
        if index == 1 && is_leap_year(year) {
            days += 1;
        }
    }
    days += (time.day as i64).max(1) - 1;

    days * SECONDS_PER_DAY + time.hour as i64 * 3600 + time.minute as i64 * 60 + time.second as i64
}

/// Update the watchdog record for this boot and decide whether to prompt
///
/// Returns `NormalBoot` unless the crash menu was shown. Every persisted-state
/// failure is logged and treated as "no crash loop".
pub fn check_watchdog(ctx: &PlatformContext<'_>) -> BootTarget {
    if !vars::get_crash_event_menu(ctx.vars) {
        return BootTarget::NormalBoot;
    }

    let status = match vars::get_watchdog_status(ctx.vars) {
        Ok(status) => status,
        Err(e) => {
            log::error!("Failed to get the watchdog status: {}", e);
            return BootTarget::NormalBoot;
        }
    };

    let reset_source = ctx.signals.reset_source();
    if !reset_source.is_watchdog() {
        if status.counter != 0 {
            if let Err(e) = vars::reset_watchdog_status(ctx.vars) {
                log::error!("Failed to reset the watchdog status: {}", e);
            }
        }
        return BootTarget::NormalBoot;
    }
    log::debug!("Reset source = {:?}", reset_source);

    let now = match ctx.signals.now() {
        Ok(now) => now,
        Err(e) => {
            log::error!("Failed to get the current time: {}", e);
            return BootTarget::NormalBoot;
        }
    };

    let mut counter = status.counter;
    if counter > 0 {
        let diff = efi_time_to_epoch(&now) - efi_time_to_epoch(&status.time_reference);
        if diff < 0 || diff > ctx.config.watchdog_delay_secs {
            counter = 0;
        }
    }

    if counter == 0 {
        if let Err(e) = vars::set_watchdog_time_reference(ctx.vars, &now) {
            log::error!("Failed to set the watchdog time reference: {}", e);
            return BootTarget::NormalBoot;
        }
    }

    counter = counter.saturating_add(1);
    log::debug!(
        "Reset source = {:?} : incrementing watchdog counter ({})",
        reset_source,
        counter
    );

    if counter <= ctx.config.watchdog_counter_max {
        if let Err(e) = vars::set_watchdog_counter(ctx.vars, counter) {
            log::error!("Failed to set the watchdog counter: {}", e);
        }
        return BootTarget::NormalBoot;
    }

    if let Err(e) = vars::reset_watchdog_status(ctx.vars) {
        log::error!("Failed to reset the watchdog status: {}", e);
    }

    ctx.ui.crash_event_prompt()
}
