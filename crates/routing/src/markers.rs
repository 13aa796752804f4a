use foundation::geo::Position;
use foundation::handles::{Generation, GenerationCounter};

/// User-placed route endpoints. Never more than two.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MarkerState {
    Empty,
    HasStart(Position),
    HasBoth(Position, Position),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MarkerEvent {
    Click(Position),
    Clear,
}

/// Which edge a [`MarkerState::next`] call took.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `Empty -> HasStart`
    Planted,
    /// `HasStart -> HasBoth`
    Completed,
    /// `HasBoth -> Empty -> HasStart` in one click.
    Replanted,
    /// Any state `-> Empty`.
    Cleared,
}

impl Transition {
    pub fn removes_markers(self) -> bool {
        matches!(self, Transition::Replanted | Transition::Cleared)
    }
}

impl MarkerState {
    /// Pure transition function.
    pub fn next(self, event: MarkerEvent) -> (MarkerState, Transition) {
        match (self, event) {
            (_, MarkerEvent::Clear) => (MarkerState::Empty, Transition::Cleared),
            (MarkerState::Empty, MarkerEvent::Click(p)) => {
                (MarkerState::HasStart(p), Transition::Planted)
            }
            (MarkerState::HasStart(start), MarkerEvent::Click(p)) => {
                (MarkerState::HasBoth(start, p), Transition::Completed)
            }
            (MarkerState::HasBoth(..), MarkerEvent::Click(p)) => {
                (MarkerState::HasStart(p), Transition::Replanted)
            }
        }
    }

    pub fn pair(self) -> MarkerPair {
        match self {
            MarkerState::Empty => MarkerPair::default(),
            MarkerState::HasStart(start) => MarkerPair {
                start: Some(start),
                end: None,
            },
            MarkerState::HasBoth(start, end) => MarkerPair {
                start: Some(start),
                end: Some(end),
            },
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct MarkerPair {
    pub start: Option<Position>,
    pub end: Option<Position>,
}

impl MarkerPair {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Endpoints of a route request, tagged with the marker generation that
/// produced them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RouteTarget {
    pub start: Position,
    pub end: Position,
    pub generation: Generation,
}

/// Side effects a transition asks the host to perform, in order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MarkerEffect {
    StopAnimation,
    /// Replace the rendered route with an empty path.
    ClearPath,
    RequestRoute(RouteTarget),
}

/// Marker state plus the generation counter used to reject route results
/// that arrive after their markers were removed.
#[derive(Debug, Default)]
pub struct MarkerStateMachine {
    state: MarkerState,
    generation: GenerationCounter,
}

impl Default for MarkerState {
    fn default() -> Self {
        MarkerState::Empty
    }
}

impl MarkerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MarkerState {
        self.state
    }

    pub fn pair(&self) -> MarkerPair {
        self.state.pair()
    }

    pub fn has_markers(&self) -> bool {
        self.state != MarkerState::Empty
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    pub fn click(&mut self, position: Position) -> Vec<MarkerEffect> {
        self.handle(MarkerEvent::Click(position))
    }

    pub fn clear(&mut self) -> Vec<MarkerEffect> {
        self.handle(MarkerEvent::Clear)
    }

    pub fn handle(&mut self, event: MarkerEvent) -> Vec<MarkerEffect> {
        let (next, transition) = self.state.next(event);
        self.state = next;

        let mut effects = Vec::new();
        if transition.removes_markers() {
            self.generation.bump();
            effects.push(MarkerEffect::StopAnimation);
            effects.push(MarkerEffect::ClearPath);
        }
        if let (Transition::Completed, MarkerState::HasBoth(start, end)) = (transition, next) {
            let generation = self.generation.bump();
            effects.push(MarkerEffect::RequestRoute(RouteTarget {
                start,
                end,
                generation,
            }));
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::{MarkerEffect, MarkerPair, MarkerState, MarkerStateMachine};
    use foundation::geo::Position;

    fn p(x: f64) -> Position {
        Position::new(x, x)
    }

    #[test]
    fn third_click_replants_start() {
        let mut m = MarkerStateMachine::new();
        assert!(m.click(p(0.0)).is_empty());
        let second = m.click(p(1.0));
        assert!(matches!(second.as_slice(), [MarkerEffect::RequestRoute(_)]));

        let third = m.click(p(2.0));
        assert_eq!(third, vec![MarkerEffect::StopAnimation, MarkerEffect::ClearPath]);
        assert_eq!(
            m.pair(),
            MarkerPair {
                start: Some(p(2.0)),
                end: None
            }
        );
    }

    #[test]
    fn route_request_fires_once_per_completion() {
        let mut m = MarkerStateMachine::new();
        let mut requests = 0;
        for x in 0..6 {
            requests += m
                .click(p(x as f64))
                .iter()
                .filter(|e| matches!(e, MarkerEffect::RequestRoute(_)))
                .count();
        }
        // Clicks 2 and 4 complete pairs; 3 and 5 replant; 6 completes again.
        assert_eq!(requests, 3);
    }

    #[test]
    fn request_carries_endpoints_and_current_generation() {
        let mut m = MarkerStateMachine::new();
        m.click(p(0.0));
        let effects = m.click(p(1.0));
        let MarkerEffect::RequestRoute(target) = effects[0] else {
            panic!("expected route request");
        };
        assert_eq!((target.start, target.end), (p(0.0), p(1.0)));
        assert_eq!(target.generation, m.generation());

        m.clear();
        assert_ne!(target.generation, m.generation());
    }

    #[test]
    fn clear_works_from_every_state() {
        for clicks in 0..3 {
            let mut m = MarkerStateMachine::new();
            for x in 0..clicks {
                m.click(p(x as f64));
            }
            let effects = m.clear();
            assert_eq!(effects, vec![MarkerEffect::StopAnimation, MarkerEffect::ClearPath]);
            assert_eq!(m.state(), MarkerState::Empty);
            assert!(!m.has_markers());
        }
    }
}
