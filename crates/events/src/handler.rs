/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide-then-evolve in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events (pure).
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// Useful in unit tests and inline flows that don't need persistence or
/// publication; production paths go through the command dispatcher, which
/// adds the event store and the bus around the same lifecycle.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: dealerdesk_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
