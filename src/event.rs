use cache_profiler::JsonEventWalk;

/// The event currently being handled, tagged onto buffer entries for later
/// error attribution and consulted by the profiler when sampling (spec §3,
/// §4.4).
///
/// The source treats this as process-wide state behind a setter; §9 calls
/// that "a concession to ergonomics... with no semantic content" and
/// suggests passing it as a parameter instead in a shared-nothing port. This
/// port keeps the setter (`Cache::set_event`/`current_event`) since the
/// single-threaded cooperative scheduling model (spec §5) makes it
/// unambiguous which event a given `get`/`set`/`delete` call belongs to —
/// there is exactly one "current" event between awaited suspension points.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
   pub name: String,
   pub payload: serde_json::Value,
   pub event_count: u64,
}

impl EventContext {
   pub fn new(name: impl Into<String>, payload: serde_json::Value, event_count: u64) -> Self {
      Self {
         name: name.into(),
         payload,
         event_count,
      }
   }

   /// A walker over this event's payload, for profile derivation/recovery.
   pub fn walker(&self) -> JsonEventWalk<'_> {
      JsonEventWalk::new(&self.payload)
   }
}
