//! Async control loop.
//!
//! Runs the [`RowerService`] in a single context, woken either by the next
//! inbox message or by a reactor timer, whichever comes first.  The timer
//! is `async-io-mini` (reactor-driven, no busy spinning) and the race is a
//! `futures-lite` `or`.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │  futures_lite::future::block_on                          │
//!  │  ┌────────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                      │  │
//!  │  │   run():  inbox.recv()  ──or──  Timer::after(tick) │  │
//!  │  │              │                         │           │  │
//!  │  │              ▼                         ▼           │  │
//!  │  │     drain ≤ budget msgs         service.poll()     │  │
//!  │  └────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────┘
//! ```

use core::ops::ControlFlow;
use core::time::Duration;

use futures_lite::FutureExt;
use log::info;

use crate::app::ports::{Clock, EventSink, Transport};
use crate::app::service::RowerService;
use crate::channels::{Inbox, Message};

/// Hand one inbox message to the service.
pub fn handle_message<T: Transport, C: Clock>(
    service: &mut RowerService<T, C>,
    msg: Message,
    sink: &mut impl EventSink,
) -> ControlFlow<()> {
    match msg {
        Message::User(cmd) => service.handle_command(cmd, sink),
        Message::Transport(event) => service.handle_transport_event(&event, sink),
        Message::Shutdown => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

/// Drain whatever is queued right now, up to the configured budget, then
/// poll deadlines.  Returns `Break` once a shutdown message was seen.
pub fn drain_once<T: Transport, C: Clock>(
    service: &mut RowerService<T, C>,
    inbox: &Inbox,
    sink: &mut impl EventSink,
) -> ControlFlow<()> {
    let budget = service.config().inbox_drain_budget;
    let mut flow = ControlFlow::Continue(());
    for _ in 0..budget {
        let Some(msg) = inbox.try_recv() else {
            break;
        };
        flow = handle_message(service, msg, sink);
        if flow.is_break() {
            break;
        }
    }
    service.note_inbox_overflows(inbox.overflow_count());
    service.poll(sink);
    flow
}

/// How long to sleep before the next wake-up: the idle tick, or sooner if
/// a deadline falls inside it.
fn wait_for<T: Transport, C: Clock>(service: &RowerService<T, C>) -> Duration {
    let tick = u64::from(service.config().idle_tick_ms);
    let wait = match service.next_deadline_ms() {
        Some(due) => due.saturating_sub(service.clock().now_ms()).min(tick),
        None => tick,
    };
    Duration::from_millis(wait)
}

/// Run the control loop until a [`Message::Shutdown`] is received.
pub async fn run<T: Transport, C: Clock, S: EventSink>(
    service: &mut RowerService<T, C>,
    inbox: &Inbox,
    sink: &mut S,
) {
    service.start(sink);

    loop {
        let wait = wait_for(service);
        let woke = async { Some(inbox.recv().await) }
            .or(async {
                async_io_mini::Timer::after(wait).await;
                None
            })
            .await;

        let mut flow = ControlFlow::Continue(());
        if let Some(msg) = woke {
            flow = handle_message(service, msg, sink);
        }
        if flow.is_continue() {
            flow = drain_once(service, inbox, sink);
        } else {
            service.poll(sink);
        }

        if flow.is_break() {
            break;
        }
    }

    info!("control loop stopped ({:?})", service.diagnostics());
}

/// Drive [`run`] to completion on the calling thread.
pub fn block_on_session<T: Transport, C: Clock, S: EventSink>(
    service: &mut RowerService<T, C>,
    inbox: &Inbox,
    sink: &mut S,
) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let session = executor.spawn(run(service, inbox, sink));
    futures_lite::future::block_on(executor.run(session));
}
