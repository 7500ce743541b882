//! Interactive quote session.
//!
//! Holds the two amount fields of a swap form and keeps them consistent. The
//! "from" field drives a debounced forward recompute through a
//! [`QuoteProvider`]; the "to" field is inverted locally using the last
//! implied rate. Results from superseded recomputes are dropped.
//!
//! All operations must be called from within a tokio runtime, since they may
//! spawn the debounce timer.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::calculator::QuoteProvider;
use crate::error::QuoteError;
use crate::types::{SwapQuote, Token};
use crate::validation::{format_amount, parse_amount, validate_token_selection};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing to show: no pair, no valid amount, or inputs changed since
    /// the last result.
    #[default]
    Idle,
    Computing,
    /// The stored quote matches both amount fields.
    Ready,
    Failed,
}

/// What feeds the USD notional of the next recompute.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Driver {
    FromAmount,
    Usd(f64),
}

/// Everything a presentation layer needs to render the form.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub from_token: Option<Token>,
    pub to_token: Option<Token>,
    pub from_amount: String,
    pub to_amount: String,
    /// Notional of the last applied quote, or the one requested through
    /// [`QuoteSession::edit_usd_amount`].
    pub usd_amount: Option<f64>,
    pub phase: Phase,
    pub loading: bool,
    /// A recompute is scheduled but has not started yet.
    pub pending: bool,
    pub error: Option<QuoteError>,
    pub from_price: Option<f64>,
    pub to_price: Option<f64>,
    pub implied_rate: Option<f64>,
    pub quote: Option<SwapQuote>,
    pub generation: u64,
}

struct SessionState {
    view: SessionSnapshot,
    driver: Driver,
    timer: Option<JoinHandle<()>>,
}

impl SessionState {
    fn new() -> Self {
        Self { view: SessionSnapshot::default(), driver: Driver::FromAmount, timer: None }
    }

    /// Supersede any scheduled or in-flight recompute.
    fn cancel(&mut self) {
        self.view.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.view.pending = false;
        if self.view.loading {
            self.view.loading = false;
            self.view.phase = if self.view.implied_rate.is_some() { Phase::Ready } else { Phase::Idle };
        }
    }

    /// Drop the current quote because the inputs no longer match it.
    fn invalidate(&mut self) {
        self.view.quote = None;
        if self.view.phase == Phase::Ready {
            self.view.phase = Phase::Idle;
        }
    }

    fn fail(&mut self, error: QuoteError) {
        let v = &mut self.view;
        v.phase = Phase::Failed;
        v.loading = false;
        v.pending = false;
        v.error = Some(error);
        v.from_amount.clear();
        v.to_amount.clear();
        v.implied_rate = None;
        v.quote = None;
    }

    /// Work out the next provider request from the current inputs.
    /// `Ok(None)` means there is nothing to compute yet.
    fn request(&self) -> Result<Option<Request>, QuoteError> {
        let (from, to) = match (&self.view.from_token, &self.view.to_token) {
            (Some(from), Some(to)) => (from.clone(), to.clone()),
            _ => return Ok(None),
        };
        validate_token_selection(Some(&from), Some(&to))?;
        let (usd, amount) = match self.driver {
            Driver::Usd(usd) => (Some(usd), None),
            // Without a known price the provider prices the amount itself.
            Driver::FromAmount => match parse_amount(&self.view.from_amount) {
                Some(amount) => (self.view.from_price.map(|p| amount * p), Some(amount)),
                None => return Ok(None),
            },
        };
        Ok(Some(Request { from, to, usd, amount }))
    }

    fn apply(&mut self, request: &Request, quote: SwapQuote) {
        let v = &mut self.view;
        match request.amount {
            Some(amount) => {
                v.to_amount = format_amount(amount * quote.to_token_amount / quote.from_token_amount);
            }
            None => {
                v.from_amount = format_amount(quote.from_token_amount);
                v.to_amount = format_amount(quote.to_token_amount);
            }
        }
        v.phase = Phase::Ready;
        v.loading = false;
        v.error = None;
        v.usd_amount = Some(quote.usd_notional);
        v.from_price = Some(quote.from_unit_price);
        v.to_price = Some(quote.to_unit_price);
        v.implied_rate = Some(quote.implied_rate());
        v.quote = Some(quote);
    }
}

struct Request {
    from: Token,
    to: Token,
    /// Notional to quote; `None` when it must be priced from `amount`.
    usd: Option<f64>,
    /// Parsed "from" amount when the from field drives the quote.
    amount: Option<f64>,
}

struct Shared {
    provider: Arc<dyn QuoteProvider>,
    debounce: Duration,
    state: Mutex<SessionState>,
    tx: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.tx.send_replace(state.view.clone());
    }

    fn schedule(self: &Arc<Self>, state: &mut SessionState, delay: Duration) {
        state.cancel();
        state.view.pending = true;
        let generation = state.view.generation;
        let shared = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move { shared.recompute(generation, delay).await }));
    }

    /// Recompute after a token change: reject identical pairs straight away,
    /// otherwise debounce.
    fn inputs_changed(self: &Arc<Self>, state: &mut SessionState) {
        if let (Some(from), Some(to)) = (&state.view.from_token, &state.view.to_token) {
            if let Err(e) = validate_token_selection(Some(from), Some(to)) {
                state.cancel();
                state.fail(e);
                return;
            }
        }
        self.schedule(state, self.debounce);
    }

    async fn recompute(self: Arc<Self>, generation: u64, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let request = {
            let mut state = self.lock();
            if state.view.generation != generation {
                return;
            }
            state.timer = None;
            state.view.pending = false;
            match state.request() {
                Ok(Some(request)) => {
                    state.view.phase = Phase::Computing;
                    state.view.loading = true;
                    state.view.error = None;
                    self.publish(&state);
                    request
                }
                Ok(None) => {
                    if state.view.phase != Phase::Failed {
                        state.view.phase = Phase::Idle;
                    }
                    self.publish(&state);
                    return;
                }
                Err(e) => {
                    state.fail(e);
                    self.publish(&state);
                    return;
                }
            }
        };

        let result = match (request.usd, request.amount) {
            (Some(usd), _) => self.provider.calculate(&request.from, &request.to, usd).await,
            (None, Some(amount)) => self.provider.calculate_for_amount(&request.from, &request.to, amount).await,
            (None, None) => Err(QuoteError::validation("Please enter a valid number")),
        };

        let mut state = self.lock();
        if state.view.generation != generation {
            debug!(generation, current = state.view.generation, "discarding stale quote result");
            return;
        }
        match result {
            Ok(quote) => {
                info!(
                    from = %request.from.symbol,
                    to = %request.to.symbol,
                    usd = quote.usd_notional,
                    rate = quote.implied_rate(),
                    "quote applied"
                );
                state.apply(&request, quote);
            }
            Err(e) => {
                debug!(error = %e, "quote failed");
                state.fail(e);
            }
        }
        self.publish(&state);
    }
}

/// Bidirectional quote state machine.
pub struct QuoteSession {
    shared: Arc<Shared>,
}

impl QuoteSession {
    pub fn new(provider: Arc<dyn QuoteProvider>, debounce: Duration) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                provider,
                debounce,
                state: Mutex::new(SessionState::new()),
                tx,
            }),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }

    /// Apply a transition under the state lock and publish the result.
    fn update<R>(&self, f: impl FnOnce(&Arc<Shared>, &mut SessionState) -> R) -> R {
        let mut state = self.shared.lock();
        let out = f(&self.shared, &mut *state);
        self.shared.publish(&state);
        out
    }

    pub fn set_from_token(&self, token: Option<Token>) {
        self.update(|shared, state| {
            if token.is_none() {
                state.view.to_amount.clear();
            }
            state.view.from_token = token;
            state.view.from_price = None;
            state.view.implied_rate = None;
            state.invalidate();
            shared.inputs_changed(state);
        })
    }

    pub fn set_to_token(&self, token: Option<Token>) {
        self.update(|shared, state| {
            if token.is_none() {
                state.view.to_amount.clear();
            }
            state.view.to_token = token;
            state.view.to_price = None;
            state.view.implied_rate = None;
            state.invalidate();
            shared.inputs_changed(state);
        })
    }

    /// Replace both tokens with a single recompute.
    pub fn set_pair(&self, from: Token, to: Token) {
        self.update(|shared, state| {
            let v = &mut state.view;
            if v.from_token.as_ref() != Some(&from) {
                v.from_price = None;
            }
            if v.to_token.as_ref() != Some(&to) {
                v.to_price = None;
            }
            v.from_token = Some(from);
            v.to_token = Some(to);
            v.implied_rate = None;
            state.invalidate();
            shared.inputs_changed(state);
        })
    }

    /// The user typed into the "from" field.
    pub fn edit_from_amount(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|shared, state| {
            let valid = parse_amount(&text).is_some();
            state.view.from_amount = text;
            state.driver = Driver::FromAmount;
            state.invalidate();
            if valid {
                shared.inputs_changed(state);
            } else {
                state.cancel();
                state.view.to_amount.clear();
                state.view.implied_rate = None;
                if state.view.phase != Phase::Failed {
                    state.view.phase = Phase::Idle;
                }
            }
        })
    }

    /// The user typed into the "to" field.
    ///
    /// The "from" field is derived locally from the last implied rate, so
    /// it may be stale until the next forward recompute.
    pub fn edit_to_amount(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|_, state| {
            let amount = parse_amount(&text);
            state.view.to_amount = text;
            let paired = state.view.from_token.is_some() && state.view.to_token.is_some();
            let rate = state.view.implied_rate.filter(|r| r.is_finite() && *r > 0.0);
            if let (true, Some(amount), Some(rate)) = (paired, amount, rate) {
                state.cancel();
                state.view.from_amount = format_amount(amount / rate);
                state.driver = Driver::FromAmount;
            }
            state.invalidate();
        })
    }

    /// Drive the quote from a USD notional instead of the "from" field.
    pub fn edit_usd_amount(&self, usd: f64) {
        self.update(|shared, state| {
            state.driver = Driver::Usd(usd);
            state.view.usd_amount = Some(usd);
            state.invalidate();
            shared.inputs_changed(state);
        })
    }

    /// Exchange the two sides in a single step.
    pub fn swap_sides(&self) {
        self.update(|shared, state| {
            let v = &mut state.view;
            mem::swap(&mut v.from_token, &mut v.to_token);
            mem::swap(&mut v.from_amount, &mut v.to_amount);
            mem::swap(&mut v.from_price, &mut v.to_price);
            v.implied_rate = v.implied_rate.map(|r| 1.0 / r);
            v.quote = v.quote.as_ref().map(SwapQuote::inverted);
            shared.schedule(state, shared.debounce);
        })
    }

    /// Clear a failure without retrying.
    pub fn dismiss_error(&self) {
        self.update(|_, state| {
            if state.view.phase == Phase::Failed {
                state.view.phase = Phase::Idle;
                state.view.error = None;
            }
        })
    }

    /// Recompute now, skipping the debounce.
    pub fn recalculate(&self) {
        self.update(|shared, state| shared.schedule(state, Duration::ZERO))
    }

    pub fn reset(&self) {
        self.update(|_, state| {
            state.cancel();
            let generation = state.view.generation;
            state.view = SessionSnapshot { generation, ..Default::default() };
            state.driver = Driver::FromAmount;
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().view.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.tx.subscribe()
    }

    /// Wait until no recompute is scheduled or in flight.
    pub async fn settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        if let Ok(view) = rx.wait_for(|v| !v.pending && !v.loading).await {
            return view.clone();
        }
        self.snapshot()
    }
}

impl Drop for QuoteSession {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.lock().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRate {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteProvider for FixedRate {
        async fn calculate(&self, from: &Token, to: &Token, usd_notional: f64) -> Result<SwapQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SwapQuote {
                from_token: from.clone(),
                to_token: to.clone(),
                usd_notional,
                from_token_amount: usd_notional / 2.0,
                to_token_amount: usd_notional,
                from_unit_price: 2.0,
                to_unit_price: 1.0,
                price_impact: Some(0.0),
                quoted_at: Utc::now(),
            })
        }

        async fn calculate_for_amount(&self, from: &Token, to: &Token, amount: f64) -> Result<SwapQuote> {
            self.calculate(from, to, amount * 2.0).await
        }
    }

    fn session() -> (QuoteSession, Arc<FixedRate>) {
        let provider = Arc::new(FixedRate { calls: AtomicUsize::new(0) });
        (QuoteSession::new(provider.clone(), DEFAULT_DEBOUNCE), provider)
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_edit_fills_to_field() {
        let (s, provider) = session();
        s.set_pair(Token::new("AAA", "A", "1"), Token::new("BBB", "B", "1"));
        s.edit_from_amount("3");
        let view = s.settled().await;
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.from_amount, "3");
        assert_eq!(view.to_amount, "6.000000");
        assert_eq!(view.implied_rate, Some(2.0));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_amount_returns_to_idle() {
        let (s, provider) = session();
        s.set_pair(Token::new("AAA", "A", "1"), Token::new("BBB", "B", "1"));
        s.edit_from_amount("3");
        s.settled().await;
        s.edit_from_amount("abc");
        let view = s.snapshot();
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.to_amount.is_empty());
        assert!(view.implied_rate.is_none());
        assert!(!view.pending);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_pair_fails_without_timer() {
        let (s, provider) = session();
        let eth = Token::new("ETH", "Ethereum", "8453");
        s.set_pair(eth.clone(), eth);
        let view = s.snapshot();
        assert_eq!(view.phase, Phase::Failed);
        assert_eq!(view.error.map(|e| e.kind()), Some(ErrorKind::Validation));
        assert!(!view.pending);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_work() {
        let (s, provider) = session();
        s.set_pair(Token::new("AAA", "A", "1"), Token::new("BBB", "B", "1"));
        s.edit_from_amount("3");
        s.reset();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let view = s.snapshot();
        assert!(view.from_token.is_none());
        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverse_edit_drops_ready_quote() {
        let (s, provider) = session();
        s.set_pair(Token::new("AAA", "A", "1"), Token::new("BBB", "B", "1"));
        s.edit_from_amount("3");
        s.settled().await;

        s.edit_to_amount("10");
        let view = s.snapshot();
        assert_eq!(view.from_amount, "5.000000");
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.quote.is_none());
        assert_eq!(view.implied_rate, Some(2.0));

        s.edit_from_amount("3");
        s.settled().await;
        s.edit_to_amount("oops");
        let view = s.snapshot();
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.quote.is_none());
        assert_eq!(view.from_amount, "3");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsetting_a_side_clears_to_field() {
        let (s, provider) = session();
        s.set_pair(Token::new("AAA", "A", "1"), Token::new("BBB", "B", "1"));
        s.edit_from_amount("3");
        s.settled().await;

        s.set_to_token(None);
        let view = s.settled().await;
        assert!(view.to_amount.is_empty());
        assert_eq!(view.from_amount, "3");
        assert_eq!(view.phase, Phase::Idle);

        s.set_to_token(Some(Token::new("BBB", "B", "1")));
        s.settled().await;
        s.set_from_token(None);
        let view = s.settled().await;
        assert!(view.to_amount.is_empty());
        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
