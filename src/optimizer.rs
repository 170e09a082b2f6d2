//! Capacitated route optimizer.
//!
//! Two deterministic phases:
//!
//! 1. **Construction**: cheapest feasible insertion into open routes; a new
//!    vehicle is opened with the stop nearest the depot only when no open
//!    route can take any remaining stop. Ties break on the lowest stop index,
//!    then lowest vehicle, then earliest position. Past the deadline the
//!    remaining stops are placed first-fit instead. If the greedy pass leaves
//!    stops unserved, a first-fit-decreasing packing is tried as well and the
//!    plan serving more demand wins; when the fleet could still carry every
//!    stop, a bounded exact packing search repairs the plan.
//! 2. **Improvement**: first-improvement local search with 2-opt and pairwise
//!    exchange inside each route, plus relocate and exchange between routes,
//!    never violating capacity. Runs until no improving move is left, the
//!    move budget is spent, or the deadline passes (checked between passes).
//!
//! All working state lives in a per-call arena; nothing is shared.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::console::{self, PhaseTimer};
use crate::domain::{OptimizationResult, Route, Termination, Totals, Vehicle};
use crate::error::ServiceError;
use crate::matrix::DistanceMatrix;

/// Default improvement-phase deadline: 2 seconds.
const DEFAULT_TIME_LIMIT_MS: u64 = 2_000;

/// Default number of improving moves applied before stopping.
const DEFAULT_MOVE_BUDGET: u64 = 10_000;

/// Search nodes the exact packing repair may visit.
const PACKING_NODE_LIMIT: u64 = 200_000;

/// Minimum gain for a move to count as improving. Guards against cycling on
/// floating-point noise.
const EPSILON: f64 = 1e-9;

/// Improvement-phase budgets.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Wall-clock budget for the improvement phase.
    pub time_limit: Duration,
    /// Maximum number of improving moves applied.
    pub move_budget: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_millis(DEFAULT_TIME_LIMIT_MS),
            move_budget: DEFAULT_MOVE_BUDGET,
        }
    }
}

/// A validated routing instance.
#[derive(Debug, Clone)]
pub struct RoutingProblem<'a> {
    matrix: &'a DistanceMatrix,
    demands: &'a [f64],
    num_vehicles: usize,
    capacity: f64,
}

impl<'a> RoutingProblem<'a> {
    /// Validates and wraps an instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use dairy_logistics::domain::Location;
    /// use dairy_logistics::matrix::DistanceMatrix;
    /// use dairy_logistics::optimizer::RoutingProblem;
    ///
    /// let locations: Vec<_> = (0..3).map(|i| Location::new(i, format!("s{}", i))).collect();
    /// let matrix = DistanceMatrix::build(&locations, 40.0, 10.0).unwrap();
    ///
    /// assert!(RoutingProblem::new(&matrix, &[0.0, 5.0, 5.0], 1, 10.0).is_ok());
    /// assert!(RoutingProblem::new(&matrix, &[0.0, 5.0, 5.0], 0, 10.0).is_err());
    /// assert!(RoutingProblem::new(&matrix, &[0.0, 5.0, 5.0], 1, 0.0).is_err());
    /// assert!(RoutingProblem::new(&matrix, &[0.0, 5.0], 1, 10.0).is_err());
    /// ```
    pub fn new(
        matrix: &'a DistanceMatrix,
        demands: &'a [f64],
        num_vehicles: i64,
        capacity: f64,
    ) -> Result<Self, ServiceError> {
        if demands.len() != matrix.len() {
            return Err(ServiceError::invalid(
                "demands",
                format!(
                    "length {} does not match locations length {}",
                    demands.len(),
                    matrix.len()
                ),
            ));
        }
        if let Some((i, d)) = demands
            .iter()
            .enumerate()
            .find(|(_, d)| !(d.is_finite() && **d >= 0.0))
        {
            return Err(ServiceError::invalid(
                format!("demands[{}]", i),
                format!("demand must be a non-negative number, got {}", d),
            ));
        }
        if demands.first().copied().unwrap_or(0.0) != 0.0 {
            return Err(ServiceError::invalid(
                "demands[0]",
                "the depot (first location) must have demand 0",
            ));
        }
        if num_vehicles <= 0 {
            return Err(ServiceError::invalid(
                "num_vehicles",
                format!("must be at least 1, got {}", num_vehicles),
            ));
        }
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(ServiceError::invalid(
                "capacity",
                format!("must be a positive number, got {}", capacity),
            ));
        }

        Ok(Self {
            matrix,
            demands,
            num_vehicles: num_vehicles as usize,
            capacity,
        })
    }

    #[inline]
    fn dist(&self, from: usize, to: usize) -> f64 {
        self.matrix.distance(from, to)
    }

    #[inline]
    fn demand(&self, stop: usize) -> f64 {
        self.demands[stop]
    }

    #[inline]
    fn fits(&self, load: f64) -> bool {
        load <= self.capacity + EPSILON
    }

    /// Number of locations, depot included.
    pub fn len(&self) -> usize {
        self.demands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demands.is_empty()
    }

    pub fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn total_demand(&self) -> f64 {
        self.demands.iter().sum()
    }

    /// Demand of the stops an empty vehicle can carry.
    fn servable_demand(&self) -> f64 {
        self.demands[1..].iter().filter(|&&d| self.fits(d)).sum()
    }

    fn fleet_capacity(&self) -> f64 {
        self.capacity * self.num_vehicles as f64
    }
}

/// One vehicle's route while the optimizer works on it.
#[derive(Debug, Clone, PartialEq)]
struct WorkingRoute {
    vehicle: Vehicle,
    stops: Vec<usize>,
    load: f64,
}

impl WorkingRoute {
    fn open(vehicle: Vehicle) -> Self {
        Self {
            vehicle,
            stops: Vec::new(),
            load: 0.0,
        }
    }

    /// Node before position `pos` (depot for the first stop).
    #[inline]
    fn prev(&self, pos: usize) -> usize {
        if pos == 0 {
            0
        } else {
            self.stops[pos - 1]
        }
    }

    /// Node after position `pos` (depot for the last stop).
    #[inline]
    fn next(&self, pos: usize) -> usize {
        self.stops.get(pos + 1).copied().unwrap_or(0)
    }

    fn distance(&self, problem: &RoutingProblem<'_>) -> f64 {
        let mut total = 0.0;
        let mut current = 0;
        for &s in &self.stops {
            total += problem.dist(current, s);
            current = s;
        }
        total + problem.dist(current, 0)
    }

    /// Cheapest position to insert `stop`, and its added distance.
    fn cheapest_insertion(&self, problem: &RoutingProblem<'_>, stop: usize) -> (usize, f64) {
        let mut best = (0, f64::INFINITY);
        for pos in 0..=self.stops.len() {
            let a = self.prev(pos);
            let b = self.stops.get(pos).copied().unwrap_or(0);
            let cost = problem.dist(a, stop) + problem.dist(stop, b) - problem.dist(a, b);
            if cost < best.1 - EPSILON {
                best = (pos, cost);
            }
        }
        best
    }

    /// Distance saved by removing the stop at `pos`.
    fn removal_gain(&self, problem: &RoutingProblem<'_>, pos: usize) -> f64 {
        let (p, s, n) = (self.prev(pos), self.stops[pos], self.next(pos));
        problem.dist(p, s) + problem.dist(s, n) - problem.dist(p, n)
    }

    fn insert(&mut self, problem: &RoutingProblem<'_>, pos: usize, stop: usize) {
        self.stops.insert(pos, stop);
        self.load += problem.demand(stop);
    }

    fn remove(&mut self, problem: &RoutingProblem<'_>, pos: usize) -> usize {
        let stop = self.stops.remove(pos);
        self.load -= problem.demand(stop);
        stop
    }
}

/// Per-call working state shared by both phases.
#[derive(Debug, Clone)]
struct Plan {
    routes: Vec<WorkingRoute>,
    unserved: Vec<usize>,
}

impl Plan {
    fn distance(&self, problem: &RoutingProblem<'_>) -> f64 {
        self.routes.iter().map(|r| r.distance(problem)).sum()
    }

    fn served_demand(&self) -> f64 {
        self.routes.iter().map(|r| r.load).sum()
    }

    fn score(&self, problem: &RoutingProblem<'_>) -> String {
        format!(
            "{}unserved/{:.2}km",
            self.unserved.len(),
            self.distance(problem)
        )
    }
}

/// Candidate placement considered during construction.
#[derive(Debug, Clone, Copy)]
struct Insertion {
    stop: usize,
    route: usize,
    position: usize,
    cost: f64,
}

/// Two-phase capacitated route optimizer.
#[derive(Debug, Clone, Default)]
pub struct RouteOptimizer {
    config: OptimizerConfig,
    console: bool,
}

impl RouteOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            console: false,
        }
    }

    /// Enables coloured per-phase console output.
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Solves with the configured time limit starting now.
    pub fn solve(&self, problem: &RoutingProblem<'_>) -> OptimizationResult {
        self.solve_until(problem, Instant::now() + self.config.time_limit)
    }

    /// Solves, returning the best plan found once `deadline` passes.
    ///
    /// Routes carry stop order and load only; distances, times and CO₂ are
    /// filled in by [`crate::cost::CostModel`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::{Duration, Instant};
    /// use dairy_logistics::domain::Location;
    /// use dairy_logistics::matrix::DistanceMatrix;
    /// use dairy_logistics::optimizer::{RouteOptimizer, RoutingProblem};
    ///
    /// let locations: Vec<_> = ["ludhiana", "jalandhar", "amritsar", "patiala"]
    ///     .iter()
    ///     .enumerate()
    ///     .map(|(i, name)| Location::resolve(i, name).unwrap())
    ///     .collect();
    /// let matrix = DistanceMatrix::build(&locations, 40.0, 50.0).unwrap();
    /// let demands = [0.0, 250.0, 200.0, 300.0];
    ///
    /// let problem = RoutingProblem::new(&matrix, &demands, 2, 500.0).unwrap();
    /// let result = RouteOptimizer::default()
    ///     .solve_until(&problem, Instant::now() + Duration::from_secs(1));
    ///
    /// assert!(result.unserved.is_empty());
    /// assert!(result.routes.iter().all(|r| r.load <= 500.0));
    /// ```
    pub fn solve_until(&self, problem: &RoutingProblem<'_>, deadline: Instant) -> OptimizationResult {
        let solve_start = Instant::now();
        let stop_count = problem.len().saturating_sub(1);

        if self.console {
            console::print_config(problem.num_vehicles(), stop_count, problem.len());
        }
        info!(
            stops = stop_count,
            vehicles = problem.num_vehicles(),
            capacity = problem.capacity(),
            "Starting route optimization"
        );

        // Phase 1: construction
        let mut ch_timer = PhaseTimer::start("ConstructionHeuristic", 0, self.console);
        let mut plan = construct(problem, deadline, &mut ch_timer);
        ch_timer.record_accepted(|| plan.score(problem));
        ch_timer.finish();

        debug!(
            routes = plan.routes.len(),
            unserved = plan.unserved.len(),
            distance_km = plan.distance(problem),
            "Construction complete"
        );

        // Phase 2: local search
        let mut ls_timer = PhaseTimer::start("LocalSearch", 1, self.console);
        let termination = improve(problem, &mut plan, &self.config, deadline, &mut ls_timer);
        let total_moves = ls_timer.moves_evaluated();
        let applied = ls_timer.steps_accepted();
        ls_timer.finish();

        let total_duration = solve_start.elapsed();
        info!(
            duration_ms = total_duration.as_millis() as u64,
            moves_evaluated = total_moves,
            moves_applied = applied,
            routes = plan.routes.iter().filter(|r| !r.stops.is_empty()).count(),
            unserved = plan.unserved.len(),
            distance_km = plan.distance(problem),
            termination = termination.as_str(),
            "Route optimization complete"
        );

        if self.console {
            console::print_solving_ended(
                total_duration,
                total_moves,
                2,
                &plan.score(problem),
                plan.unserved.is_empty(),
            );
        }

        into_result(plan, termination)
    }
}

/// Greedy construction, falling back to packing when the greedy pass strands
/// demand that the fleet could carry.
fn construct(problem: &RoutingProblem<'_>, deadline: Instant, timer: &mut PhaseTimer) -> Plan {
    let greedy = cheapest_insertion(problem, deadline, timer);
    if greedy.unserved.is_empty() {
        return greedy;
    }

    let packed = first_fit_decreasing(problem, timer);
    let mut best = if packed.served_demand() > greedy.served_demand() + EPSILON {
        debug!(
            greedy_unserved = greedy.unserved.len(),
            packed_unserved = packed.unserved.len(),
            "Packing fallback serves more demand"
        );
        packed
    } else {
        greedy
    };

    let stranded = best.unserved.iter().any(|&s| problem.fits(problem.demand(s)));
    if stranded && problem.servable_demand() <= problem.fleet_capacity() + EPSILON {
        match pack_exactly(problem, deadline, timer) {
            Some(repaired) => {
                debug!(
                    stranded = best.unserved.len() - repaired.unserved.len(),
                    "Exact packing placed every servable stop"
                );
                best = repaired;
            }
            None => debug!("Exact packing found no complete assignment within budget"),
        }
    }
    best
}

/// Cheapest feasible insertion with lazily opened vehicles.
fn cheapest_insertion(problem: &RoutingProblem<'_>, deadline: Instant, timer: &mut PhaseTimer) -> Plan {
    let mut routes: Vec<WorkingRoute> = Vec::new();
    let mut unserved = Vec::new();

    // Stops heavier than an empty vehicle can never be served
    let mut unrouted: Vec<usize> = Vec::with_capacity(problem.len());
    for stop in 1..problem.len() {
        if problem.fits(problem.demand(stop)) {
            unrouted.push(stop);
        } else {
            unserved.push(stop);
        }
    }

    while !unrouted.is_empty() {
        if Instant::now() >= deadline {
            debug!(remaining = unrouted.len(), "Deadline reached during construction");
            first_fit(problem, &mut routes, &mut unrouted, &mut unserved, timer);
            break;
        }

        let mut best: Option<Insertion> = None;
        for &stop in &unrouted {
            for (r, route) in routes.iter().enumerate() {
                timer.record_move();
                if !problem.fits(route.load + problem.demand(stop)) {
                    continue;
                }
                let (position, cost) = route.cheapest_insertion(problem, stop);
                if best.map_or(true, |b| cost < b.cost - EPSILON) {
                    best = Some(Insertion {
                        stop,
                        route: r,
                        position,
                        cost,
                    });
                }
            }
        }

        if let Some(ins) = best {
            routes[ins.route].insert(problem, ins.position, ins.stop);
            unrouted.retain(|&s| s != ins.stop);
            continue;
        }

        if routes.len() < problem.num_vehicles() {
            // Open the next vehicle with the stop closest to the depot
            let mut seed = unrouted[0];
            for &stop in &unrouted[1..] {
                if problem.dist(0, stop) < problem.dist(0, seed) - EPSILON {
                    seed = stop;
                }
            }
            let mut route = WorkingRoute::open(Vehicle::new(routes.len() + 1, problem.capacity()));
            route.insert(problem, 0, seed);
            routes.push(route);
            unrouted.retain(|&s| s != seed);
        } else {
            unserved.append(&mut unrouted);
        }
    }

    unserved.sort_unstable();
    Plan { routes, unserved }
}

/// Places each remaining stop, lowest index first, into the first route with
/// room, opening vehicles as needed. Linear in the routes per stop.
fn first_fit(
    problem: &RoutingProblem<'_>,
    routes: &mut Vec<WorkingRoute>,
    unrouted: &mut Vec<usize>,
    unserved: &mut Vec<usize>,
    timer: &mut PhaseTimer,
) {
    unrouted.sort_unstable();
    for stop in unrouted.drain(..) {
        timer.record_move();
        let demand = problem.demand(stop);
        if let Some(route) = routes.iter_mut().find(|r| problem.fits(r.load + demand)) {
            let (pos, _) = route.cheapest_insertion(problem, stop);
            route.insert(problem, pos, stop);
        } else if routes.len() < problem.num_vehicles() {
            let mut route = WorkingRoute::open(Vehicle::new(routes.len() + 1, problem.capacity()));
            route.insert(problem, 0, stop);
            routes.push(route);
        } else {
            unserved.push(stop);
        }
    }
}

/// Packs stops by descending demand into the first vehicle with room, then
/// orders each vehicle's stops by cheapest insertion.
fn first_fit_decreasing(problem: &RoutingProblem<'_>, timer: &mut PhaseTimer) -> Plan {
    let mut order: Vec<usize> = (1..problem.len()).collect();
    // Stable sort keeps lower indices first among equal demands
    order.sort_by(|&a, &b| problem.demand(b).total_cmp(&problem.demand(a)));

    let mut bins: Vec<(f64, Vec<usize>)> = Vec::new();
    let mut unserved = Vec::new();
    for stop in order {
        timer.record_move();
        let demand = problem.demand(stop);
        if let Some(bin) = bins.iter_mut().find(|(load, _)| problem.fits(load + demand)) {
            bin.0 += demand;
            bin.1.push(stop);
        } else if bins.len() < problem.num_vehicles() && problem.fits(demand) {
            bins.push((demand, vec![stop]));
        } else {
            unserved.push(stop);
        }
    }

    let routes = bins.into_iter().map(|(_, stops)| stops).collect();
    unserved.sort_unstable();
    Plan {
        routes: sequence_bins(problem, routes),
        unserved,
    }
}

/// Orders each bin's stops by cheapest insertion, lowest index first.
fn sequence_bins(problem: &RoutingProblem<'_>, bins: Vec<Vec<usize>>) -> Vec<WorkingRoute> {
    bins.into_iter()
        .filter(|stops| !stops.is_empty())
        .enumerate()
        .map(|(i, mut stops)| {
            stops.sort_unstable();
            let mut route = WorkingRoute::open(Vehicle::new(i + 1, problem.capacity()));
            for stop in stops {
                let (pos, _) = route.cheapest_insertion(problem, stop);
                route.insert(problem, pos, stop);
            }
            route
        })
        .collect()
}

/// Depth-first bin packing of every servable stop, largest first.
///
/// Gives up after [`PACKING_NODE_LIMIT`] nodes or at the deadline.
fn pack_exactly(problem: &RoutingProblem<'_>, deadline: Instant, timer: &mut PhaseTimer) -> Option<Plan> {
    let mut items: Vec<usize> = Vec::new();
    let mut unserved = Vec::new();
    for stop in 1..problem.len() {
        if problem.fits(problem.demand(stop)) {
            items.push(stop);
        } else {
            unserved.push(stop);
        }
    }
    items.sort_by(|&a, &b| problem.demand(b).total_cmp(&problem.demand(a)));

    let mut search = Packing {
        problem,
        items: &items,
        loads: vec![0.0; problem.num_vehicles()],
        bins: vec![0; items.len()],
        nodes: 0,
        exhausted: false,
        deadline,
        timer,
    };
    if !search.place(0) {
        return None;
    }

    let mut bins = vec![Vec::new(); problem.num_vehicles()];
    for (&stop, &bin) in items.iter().zip(&search.bins) {
        bins[bin].push(stop);
    }
    Some(Plan {
        routes: sequence_bins(problem, bins),
        unserved,
    })
}

/// Backtracking state for [`pack_exactly`].
struct Packing<'p, 'a, 't> {
    problem: &'p RoutingProblem<'a>,
    items: &'p [usize],
    loads: Vec<f64>,
    bins: Vec<usize>,
    nodes: u64,
    exhausted: bool,
    deadline: Instant,
    timer: &'t mut PhaseTimer,
}

impl Packing<'_, '_, '_> {
    fn place(&mut self, k: usize) -> bool {
        if k == self.items.len() {
            return true;
        }
        self.nodes += 1;
        self.timer.record_move();
        if self.nodes > PACKING_NODE_LIMIT || (self.nodes % 1024 == 1 && Instant::now() >= self.deadline) {
            self.exhausted = true;
        }
        if self.exhausted {
            return false;
        }

        let demand = self.problem.demand(self.items[k]);
        for b in 0..self.loads.len() {
            // Bins with equal load are interchangeable
            let load = self.loads[b];
            if self.loads[..b].iter().any(|&l| (l - load).abs() <= EPSILON) {
                continue;
            }
            if !self.problem.fits(load + demand) {
                continue;
            }
            self.loads[b] += demand;
            self.bins[k] = b;
            if self.place(k + 1) {
                return true;
            }
            self.loads[b] -= demand;
            if self.exhausted {
                return false;
            }
        }
        false
    }
}

/// Runs local-search passes until none improves or a budget runs out.
fn improve(
    problem: &RoutingProblem<'_>,
    plan: &mut Plan,
    config: &OptimizerConfig,
    deadline: Instant,
    timer: &mut PhaseTimer,
) -> Termination {
    let mut search = LocalSearch {
        problem,
        budget: config.move_budget,
        applied: 0,
        timer,
    };

    loop {
        if Instant::now() >= deadline {
            return Termination::DeadlineExpired;
        }

        let improved = match search.pass(plan) {
            Ok(improved) => improved,
            Err(termination) => return termination,
        };
        if !improved {
            return Termination::Converged;
        }
    }
}

/// Move application with budget accounting.
struct LocalSearch<'p, 'a, 't> {
    problem: &'p RoutingProblem<'a>,
    budget: u64,
    applied: u64,
    timer: &'t mut PhaseTimer,
}

impl LocalSearch<'_, '_, '_> {
    /// Charges one applied move against the budget.
    fn charge(&mut self, plan: &Plan) -> Result<(), Termination> {
        if self.applied >= self.budget {
            return Err(Termination::MoveBudgetExhausted);
        }
        self.applied += 1;
        let problem = self.problem;
        self.timer.record_accepted(|| plan.score(problem));
        Ok(())
    }

    /// One pass over every operator. Returns whether anything improved.
    fn pass(&mut self, plan: &mut Plan) -> Result<bool, Termination> {
        let mut improved = false;
        improved |= self.insert_unserved(plan)?;
        for r in 0..plan.routes.len() {
            improved |= self.two_opt(plan, r)?;
            improved |= self.swap_within(plan, r)?;
        }
        improved |= self.relocate_between(plan)?;
        improved |= self.exchange_between(plan)?;
        Ok(improved)
    }

    /// Places unserved stops into any route that now has room.
    fn insert_unserved(&mut self, plan: &mut Plan) -> Result<bool, Termination> {
        let problem = self.problem;
        let mut improved = false;
        let mut i = 0;
        while i < plan.unserved.len() {
            let stop = plan.unserved[i];
            let mut best: Option<(usize, usize, f64)> = None;
            for (r, route) in plan.routes.iter().enumerate() {
                self.timer.record_move();
                if !problem.fits(route.load + problem.demand(stop)) {
                    continue;
                }
                let (pos, cost) = route.cheapest_insertion(problem, stop);
                if best.map_or(true, |b| cost < b.2 - EPSILON) {
                    best = Some((r, pos, cost));
                }
            }
            match best {
                Some((r, pos, _)) => {
                    self.charge(plan)?;
                    plan.routes[r].insert(problem, pos, stop);
                    plan.unserved.remove(i);
                    improved = true;
                }
                None => i += 1,
            }
        }
        Ok(improved)
    }

    /// 2-opt: reverse `stops[i..=j]` when that shortens the route.
    fn two_opt(&mut self, plan: &mut Plan, r: usize) -> Result<bool, Termination> {
        let problem = self.problem;
        let mut improved = false;
        let len = plan.routes[r].stops.len();
        for i in 0..len {
            for j in (i + 1)..len {
                self.timer.record_move();
                let route = &plan.routes[r];
                let (a, si) = (route.prev(i), route.stops[i]);
                let (sj, b) = (route.stops[j], route.next(j));
                let delta = problem.dist(a, sj) + problem.dist(si, b)
                    - problem.dist(a, si)
                    - problem.dist(sj, b);
                if delta < -EPSILON {
                    self.charge(plan)?;
                    plan.routes[r].stops[i..=j].reverse();
                    improved = true;
                }
            }
        }
        Ok(improved)
    }

    /// Pairwise exchange of two non-adjacent stops in the same route.
    fn swap_within(&mut self, plan: &mut Plan, r: usize) -> Result<bool, Termination> {
        let problem = self.problem;
        let mut improved = false;
        let len = plan.routes[r].stops.len();
        for i in 0..len {
            for j in (i + 2)..len {
                self.timer.record_move();
                let route = &plan.routes[r];
                let (a, b) = (route.stops[i], route.stops[j]);
                let (pa, na) = (route.prev(i), route.next(i));
                let (pb, nb) = (route.prev(j), route.next(j));
                let delta = problem.dist(pa, b) + problem.dist(b, na) + problem.dist(pb, a)
                    + problem.dist(a, nb)
                    - problem.dist(pa, a)
                    - problem.dist(a, na)
                    - problem.dist(pb, b)
                    - problem.dist(b, nb);
                if delta < -EPSILON {
                    self.charge(plan)?;
                    plan.routes[r].stops.swap(i, j);
                    improved = true;
                }
            }
        }
        Ok(improved)
    }

    /// Moves a stop to the cheapest position in another route with room.
    fn relocate_between(&mut self, plan: &mut Plan) -> Result<bool, Termination> {
        let problem = self.problem;
        let mut improved = false;
        for from in 0..plan.routes.len() {
            let mut pos = 0;
            while pos < plan.routes[from].stops.len() {
                let stop = plan.routes[from].stops[pos];
                let gain = plan.routes[from].removal_gain(problem, pos);

                let mut best: Option<(usize, usize, f64)> = None;
                for (to, target) in plan.routes.iter().enumerate() {
                    self.timer.record_move();
                    if to == from || !problem.fits(target.load + problem.demand(stop)) {
                        continue;
                    }
                    let (at, cost) = target.cheapest_insertion(problem, stop);
                    if cost < gain - EPSILON && best.map_or(true, |b| cost < b.2 - EPSILON) {
                        best = Some((to, at, cost));
                    }
                }

                match best {
                    Some((to, at, _)) => {
                        self.charge(plan)?;
                        plan.routes[from].remove(problem, pos);
                        plan.routes[to].insert(problem, at, stop);
                        improved = true;
                    }
                    None => pos += 1,
                }
            }
        }
        Ok(improved)
    }

    /// Swaps one stop of a route with one stop of another, in place.
    fn exchange_between(&mut self, plan: &mut Plan) -> Result<bool, Termination> {
        let problem = self.problem;
        let mut improved = false;
        let n_routes = plan.routes.len();
        for r1 in 0..n_routes {
            for r2 in (r1 + 1)..n_routes {
                for i in 0..plan.routes[r1].stops.len() {
                    for j in 0..plan.routes[r2].stops.len() {
                        self.timer.record_move();
                        let (first, second) = (&plan.routes[r1], &plan.routes[r2]);
                        let (a, b) = (first.stops[i], second.stops[j]);
                        let (da, db) = (problem.demand(a), problem.demand(b));
                        if !problem.fits(first.load - da + db) || !problem.fits(second.load - db + da) {
                            continue;
                        }

                        let (p1, n1) = (first.prev(i), first.next(i));
                        let (p2, n2) = (second.prev(j), second.next(j));
                        let delta = problem.dist(p1, b) + problem.dist(b, n1)
                            - problem.dist(p1, a)
                            - problem.dist(a, n1)
                            + problem.dist(p2, a)
                            + problem.dist(a, n2)
                            - problem.dist(p2, b)
                            - problem.dist(b, n2);
                        if delta < -EPSILON {
                            self.charge(plan)?;
                            plan.routes[r1].stops[i] = b;
                            plan.routes[r1].load += db - da;
                            plan.routes[r2].stops[j] = a;
                            plan.routes[r2].load += da - db;
                            improved = true;
                        }
                    }
                }
            }
        }
        Ok(improved)
    }
}

/// Drops emptied vehicles and converts the arena into the public result.
fn into_result(plan: Plan, termination: Termination) -> OptimizationResult {
    let mut routes: Vec<Route> = plan
        .routes
        .into_iter()
        .filter(|r| !r.stops.is_empty())
        .map(|r| {
            let mut route = Route::new(r.vehicle.id, r.stops);
            route.load = r.load;
            route
        })
        .collect();
    routes.sort_by_key(|r| r.vehicle_id);

    let mut unserved = plan.unserved;
    unserved.sort_unstable();

    OptimizationResult {
        routes,
        unserved,
        totals: Totals::default(),
        termination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coord, Location};
    use std::collections::BTreeSet;

    /// Locations on a line at `x` km east of the depot (1 degree ~ 111 km).
    fn line_matrix(xs: &[f64]) -> DistanceMatrix {
        let locations: Vec<_> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| Location::new(i, format!("p{}", i)).with_coord(Coord::new(0.0, x / 111.195)))
            .collect();
        DistanceMatrix::build(&locations, 40.0, 50.0).unwrap()
    }

    fn punjab_matrix(names: &[&str]) -> DistanceMatrix {
        let locations: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| Location::resolve(i, n).unwrap())
            .collect();
        DistanceMatrix::build(&locations, 40.0, 50.0).unwrap()
    }

    fn solve(matrix: &DistanceMatrix, demands: &[f64], vehicles: i64, capacity: f64) -> OptimizationResult {
        let problem = RoutingProblem::new(matrix, demands, vehicles, capacity).unwrap();
        RouteOptimizer::default().solve_until(&problem, Instant::now() + Duration::from_secs(5))
    }

    fn assert_invariants(result: &OptimizationResult, demands: &[f64], capacity: f64) {
        let mut seen = BTreeSet::new();
        for route in &result.routes {
            let load: f64 = route.stops.iter().map(|&s| demands[s]).sum();
            assert!((route.load - load).abs() < 1e-6, "cached load drifted");
            assert!(route.load <= capacity + 1e-6, "route over capacity");
            for &s in &route.stops {
                assert!(s != 0, "depot appears as a stop");
                assert!(seen.insert(s), "stop {} served twice", s);
            }
        }
        for &s in &result.unserved {
            assert!(seen.insert(s), "stop {} both served and unserved", s);
        }
        let all: BTreeSet<usize> = (1..demands.len()).collect();
        assert_eq!(seen, all, "served + unserved must cover every stop");
    }

    const SCENARIO: [&str; 4] = ["depot", "jalandhar", "amritsar", "patiala"];

    #[test]
    fn test_two_vehicles_serve_everything() {
        let matrix = punjab_matrix(&SCENARIO);
        let demands = [0.0, 250.0, 300.0, 200.0];
        let result = solve(&matrix, &demands, 2, 500.0);

        assert_invariants(&result, &demands, 500.0);
        assert_eq!(result.routes.len(), 2);
        assert!(result.unserved.is_empty());
        let served: f64 = result.routes.iter().map(|r| r.load).sum();
        assert_eq!(served, 750.0);
    }

    #[test]
    fn test_capacity_400_leaves_oversubscribed_stops_unserved() {
        // No two of 250/300/200 fit together in 400 L
        let matrix = punjab_matrix(&SCENARIO);
        let demands = [0.0, 250.0, 300.0, 200.0];

        let two = solve(&matrix, &demands, 2, 400.0);
        assert_invariants(&two, &demands, 400.0);
        assert_eq!(two.routes.len(), 2);
        assert_eq!(two.unserved.len(), 1);

        let one = solve(&matrix, &demands, 1, 400.0);
        assert_invariants(&one, &demands, 400.0);
        assert_eq!(one.routes.len(), 1);
        assert!(one.routes[0].load <= 400.0);
        assert_eq!(one.unserved.len(), 2);
    }

    #[test]
    fn test_single_vehicle_overflow_reports_one_stop() {
        let matrix = punjab_matrix(&SCENARIO);
        let demands = [0.0, 250.0, 300.0, 200.0];
        let result = solve(&matrix, &demands, 1, 500.0);

        assert_invariants(&result, &demands, 500.0);
        assert_eq!(result.unserved.len(), 1);
        assert!(result.routes[0].load <= 500.0);
    }

    #[test]
    fn test_oversized_stop_is_unserved() {
        let matrix = line_matrix(&[0.0, 10.0, 20.0]);
        let demands = [0.0, 50.0, 500.0];
        let result = solve(&matrix, &demands, 3, 100.0);

        assert_invariants(&result, &demands, 100.0);
        assert_eq!(result.unserved, vec![2]);
    }

    #[test]
    fn test_zero_demand_stops_are_routed() {
        let matrix = line_matrix(&[0.0, 5.0, 10.0, 15.0]);
        let demands = [0.0, 0.0, 100.0, 0.0];
        let problem = RoutingProblem::new(&matrix, &demands, 1, 100.0).unwrap();
        let result = RouteOptimizer::default().solve(&problem);

        assert_invariants(&result, &demands, 100.0);
        assert!(result.unserved.is_empty());
    }

    #[test]
    fn test_fits_when_total_demand_within_fleet() {
        // Greedy alone strands a stop here; packing recovers it
        let matrix = line_matrix(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let demands = [0.0, 5.0, 4.0, 6.0, 5.0];
        let result = solve(&matrix, &demands, 2, 10.0);

        assert_invariants(&result, &demands, 10.0);
        assert!(result.unserved.is_empty());
    }

    #[test]
    fn test_exact_packing_repairs_stranded_stop() {
        // Greedy and first-fit-decreasing both strand a 3; 5+4+3 twice fills 2 x 12
        let matrix = line_matrix(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        for demands in [
            [0.0, 5.0, 5.0, 4.0, 4.0, 3.0, 3.0],
            [0.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0],
        ] {
            let result = solve(&matrix, &demands, 2, 12.0);
            assert_invariants(&result, &demands, 12.0);
            assert!(result.unserved.is_empty(), "unserved {:?}", result.unserved);
            assert_eq!(result.routes.len(), 2);
        }
    }

    #[test]
    fn test_exact_packing_keeps_oversized_stops_out() {
        let matrix = line_matrix(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let demands = [0.0, 5.0, 5.0, 4.0, 4.0, 3.0, 3.0, 40.0];
        let result = solve(&matrix, &demands, 2, 12.0);
        assert_invariants(&result, &demands, 12.0);
        assert_eq!(result.unserved, vec![7]);
    }

    #[test]
    fn test_deadline_bounds_construction() {
        let xs: Vec<f64> = (0..801).map(|i| (i % 97) as f64 + (i / 97) as f64 * 0.5).collect();
        let matrix = line_matrix(&xs);
        let mut demands = vec![1.0; xs.len()];
        demands[0] = 0.0;
        let problem = RoutingProblem::new(&matrix, &demands, 5, 160.0).unwrap();

        let started = Instant::now();
        let result = RouteOptimizer::default().solve_until(&problem, started + Duration::from_millis(10));

        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert_eq!(result.termination, Termination::DeadlineExpired);
        assert_invariants(&result, &demands, 160.0);
        assert!(result.unserved.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let names: Vec<&str> = crate::demo_data::KNOWN_CITIES.iter().map(|c| c.key).collect();
        let matrix = punjab_matrix(&names);
        let demands = [0.0, 300.0, 250.0, 420.0, 150.0, 380.0, 200.0, 260.0, 310.0, 190.0];

        let first = solve(&matrix, &demands, 3, 1000.0);
        for _ in 0..5 {
            assert_eq!(solve(&matrix, &demands, 3, 1000.0), first);
        }
        assert_eq!(first.termination, Termination::Converged);
        assert_invariants(&first, &demands, 1000.0);
    }

    #[test]
    fn test_tie_breaks_on_lowest_index() {
        // Two stops at the same spot; the lower index is seeded first
        let matrix = line_matrix(&[0.0, 10.0, 10.0]);
        let demands = [0.0, 60.0, 60.0];
        let result = solve(&matrix, &demands, 2, 100.0);

        assert_eq!(result.routes[0].stops, vec![1]);
        assert_eq!(result.routes[1].stops, vec![2]);
    }

    #[test]
    fn test_two_opt_untangles_route() {
        let matrix = line_matrix(&[0.0, 10.0, 20.0, 30.0]);
        let problem = RoutingProblem::new(&matrix, &[0.0, 1.0, 1.0, 1.0], 1, 10.0).unwrap();
        let mut route = WorkingRoute::open(Vehicle::new(1, 10.0));
        route.stops = vec![3, 1, 2];
        route.load = 3.0;
        let mut plan = Plan {
            routes: vec![route],
            unserved: vec![],
        };
        let before = plan.distance(&problem);

        let mut timer = PhaseTimer::start("test", 0, false);
        let termination = improve(
            &problem,
            &mut plan,
            &OptimizerConfig::default(),
            Instant::now() + Duration::from_secs(5),
            &mut timer,
        );

        assert_eq!(termination, Termination::Converged);
        assert!(plan.distance(&problem) < before);
        assert!((plan.distance(&problem) - 60.0).abs() < 0.05);
    }

    #[test]
    fn test_move_budget_stops_search() {
        let matrix = line_matrix(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let problem = RoutingProblem::new(&matrix, &[0.0, 1.0, 1.0, 1.0, 1.0], 1, 10.0).unwrap();
        let mut route = WorkingRoute::open(Vehicle::new(1, 10.0));
        route.stops = vec![4, 1, 3, 2];
        route.load = 4.0;
        let mut plan = Plan {
            routes: vec![route],
            unserved: vec![],
        };

        let config = OptimizerConfig {
            move_budget: 0,
            ..OptimizerConfig::default()
        };
        let mut timer = PhaseTimer::start("test", 0, false);
        let termination = improve(
            &problem,
            &mut plan,
            &config,
            Instant::now() + Duration::from_secs(5),
            &mut timer,
        );

        assert_eq!(termination, Termination::MoveBudgetExhausted);
        assert_eq!(plan.routes[0].stops, vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_expired_deadline_returns_construction() {
        let matrix = punjab_matrix(&SCENARIO);
        let demands = [0.0, 250.0, 300.0, 200.0];
        let problem = RoutingProblem::new(&matrix, &demands, 2, 500.0).unwrap();

        let result = RouteOptimizer::default().solve_until(&problem, Instant::now());

        assert_eq!(result.termination, Termination::DeadlineExpired);
        assert_invariants(&result, &demands, 500.0);
        assert!(result.unserved.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let matrix = line_matrix(&[0.0, 1.0, 2.0]);
        let err = RoutingProblem::new(&matrix, &[0.0, 1.0], 1, 10.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "demands"));

        let err = RoutingProblem::new(&matrix, &[5.0, 1.0, 1.0], 1, 10.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "demands[0]"));

        let err = RoutingProblem::new(&matrix, &[0.0, -1.0, 1.0], 1, 10.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "demands[1]"));

        let err = RoutingProblem::new(&matrix, &[0.0, 1.0, 1.0], -2, 10.0).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "num_vehicles"));

        let err = RoutingProblem::new(&matrix, &[0.0, 1.0, 1.0], 1, f64::NAN).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { ref field, .. } if field == "capacity"));
    }
}
