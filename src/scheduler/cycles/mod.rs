mod immediate_check;
mod message_send;
mod midnight_refresh;
mod scheduled_refresh;

pub use immediate_check::ImmediateCheckCycle;
pub use message_send::MessageSendCycle;
pub use midnight_refresh::MidnightRefreshCycle;
pub use scheduled_refresh::ScheduledRefreshCycle;

use super::cycle::Cycle;
use crate::config::ScheduleSettings;
use std::sync::Arc;

/// The standard cycle set. The message cycle is left out when no messaging
/// channel is configured.
pub fn default_cycles(settings: &ScheduleSettings, messaging_enabled: bool) -> Vec<Arc<dyn Cycle>> {
    let mut cycles: Vec<Arc<dyn Cycle>> = vec![
        Arc::new(ScheduledRefreshCycle::new(
            settings.scheduled_refresh_interval,
            settings.jitter,
        )),
        Arc::new(ImmediateCheckCycle::new(
            settings.immediate_check_interval,
            settings.jitter,
        )),
    ];
    if messaging_enabled {
        cycles.push(Arc::new(MessageSendCycle::new(
            settings.message_interval,
            settings.jitter,
        )));
    }
    cycles.push(Arc::new(MidnightRefreshCycle::new(settings.timezone)));
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::CycleKind;

    #[test]
    fn test_default_cycles() {
        let settings = ScheduleSettings::default();

        let kinds: Vec<CycleKind> = default_cycles(&settings, true)
            .iter()
            .map(|c| c.kind())
            .collect();
        assert_eq!(kinds, CycleKind::ALL.to_vec());

        let without_messaging = default_cycles(&settings, false);
        assert_eq!(without_messaging.len(), 3);
        assert!(without_messaging
            .iter()
            .all(|c| c.kind() != CycleKind::MessageSend));
        assert!(without_messaging
            .iter()
            .all(|c| c.kind() == CycleKind::MidnightRefresh || c.schedule().runs_on_startup()));
    }
}
