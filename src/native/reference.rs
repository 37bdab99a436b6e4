//! Built-in engine behind [`NativeEngine`], used when no external engine is linked.
//!
//! Bodies live in handle-ordered maps. Each substep moves the rigid bodies
//! into a flat list so the solvers can address them by index, then puts them
//! back.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use log::{debug, trace};

use super::journal::{Journal, NativeCall, ResourceCounts};
use super::{
    BodyHandle, ConstraintHandle, ConstraintSetup, ContactManifold, ContactPoint, EngineLoader,
    MotionStateHandle, NativeEngine, RigidBodySetup, ShapeGeometry, ShapeHandle, SoftGeometry,
    SoftMaterial, SoftNode, VehicleHandle,
};
use crate::collision::{
    filters_match, BroadPhaseEntry, NarrowPhase, Proxy, ShapeRecord, ShapeStore, SweepAndPrune,
};
use crate::config::{WorldConfig, DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK};
use crate::core::{
    ActivationState, JointOp, Transform, VehicleTuning, Velocity, WheelDescription,
};
use crate::dynamics::{
    pair_mut, Anchor, Contact, ContactSolver, CrossLink, Integrator, Joint, RaycastVehicle,
    RigidState, SoftBody,
};
use crate::error::Result;

/// Pairs closer than this produce contact points.
const CONTACT_THRESHOLD: f32 = 0.02;
const JOINT_ITERATIONS: u32 = 4;
/// Group and mask bodies without an explicit filter get when static.
const STATIC_FILTER: (i32, i32) = (2, !2);

type IndexedBodies = Vec<(BodyHandle, RigidState)>;

pub struct ReferenceEngine {
    journal: Option<Journal>,
    next_handle: u64,
    world_created: bool,
    gravity: Vec3,
    accumulator: f32,
    shapes: ShapeStore,
    motion_states: HashMap<MotionStateHandle, Transform>,
    rigid: BTreeMap<BodyHandle, RigidState>,
    soft: BTreeMap<BodyHandle, SoftBody>,
    constraints: BTreeMap<ConstraintHandle, Joint>,
    vehicles: BTreeMap<VehicleHandle, RaycastVehicle>,
    cross_links: Vec<CrossLink>,
    manifolds: Vec<ContactManifold>,
    solver: ContactSolver,
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ReferenceEngine {
    pub fn new(journal: Option<Journal>) -> Self {
        Self {
            journal,
            next_handle: 1,
            world_created: false,
            gravity: Vec3::ZERO,
            accumulator: 0.0,
            shapes: ShapeStore::new(),
            motion_states: HashMap::new(),
            rigid: BTreeMap::new(),
            soft: BTreeMap::new(),
            constraints: BTreeMap::new(),
            vehicles: BTreeMap::new(),
            cross_links: Vec::new(),
            manifolds: Vec::new(),
            solver: ContactSolver::default(),
        }
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn record(&self, call: NativeCall) {
        if let Some(journal) = &self.journal {
            journal.record(call);
        }
    }

    fn rigid_mut(&mut self, body: BodyHandle) -> Option<&mut RigidState> {
        let state = self.rigid.get_mut(&body);
        if state.is_none() {
            trace!("reference engine: no rigid body {:?}", body);
        }
        state
    }

    fn drop_manifolds_of(&mut self, body: BodyHandle) {
        self.manifolds
            .retain(|manifold| manifold.body0 != body && manifold.body1 != body);
    }

    fn proxies_of(&self, state: &RigidState) -> Vec<Proxy> {
        if !state.in_world {
            return Vec::new();
        }
        self.shapes.proxies(state.shape, &state.transform)
    }

    fn substep(&mut self, dt: f32) {
        let mut bodies: IndexedBodies = std::mem::take(&mut self.rigid).into_iter().collect();
        let index: HashMap<BodyHandle, usize> = bodies
            .iter()
            .enumerate()
            .map(|(i, (handle, _))| (*handle, i))
            .collect();
        let integrator = Integrator::new(self.gravity);

        let proxies: Vec<Vec<Proxy>> = bodies.iter().map(|(_, s)| self.proxies_of(s)).collect();
        self.update_vehicles(&mut bodies, &index, &proxies, dt);

        for (_, body) in bodies.iter_mut() {
            integrator.integrate_velocity(body, dt);
        }

        let (mut contacts, owners) = self.detect_contacts(&mut bodies, &proxies);

        for _ in 0..JOINT_ITERATIONS {
            for joint in self.constraints.values_mut() {
                solve_joint(joint, &mut bodies, &index, dt);
            }
        }

        self.solver.solve_velocities(&mut bodies, &mut contacts, dt);
        self.store_applied_impulses(&contacts, &owners);
        self.solver.correct_positions(&mut bodies, &contacts);

        for (_, body) in bodies.iter_mut() {
            integrator.integrate_position(body, dt);
        }

        self.step_soft_bodies(&bodies, &index, dt);

        for (_, body) in bodies.iter_mut() {
            if body.in_world {
                body.update_sleep(dt);
            }
            self.motion_states.insert(body.motion_state, body.transform);
        }
        self.rigid = bodies.into_iter().collect();
    }

    fn update_vehicles(
        &mut self,
        bodies: &mut IndexedBodies,
        index: &HashMap<BodyHandle, usize>,
        proxies: &[Vec<Proxy>],
        dt: f32,
    ) {
        if self.vehicles.is_empty() {
            return;
        }
        let obstacles: Vec<(BodyHandle, Proxy)> = bodies
            .iter()
            .zip(proxies)
            .filter(|((_, state), _)| state.has_contact_response())
            .flat_map(|((handle, _), list)| list.iter().map(move |proxy| (*handle, *proxy)))
            .collect();
        for vehicle in self.vehicles.values_mut() {
            if let Some(&i) = index.get(&vehicle.chassis) {
                vehicle.update(&mut bodies[i].1, &obstacles, dt);
            }
        }
    }

    /// Rebuilds the manifolds and returns the contacts the solver has to resolve,
    /// each with the manifold point it came from.
    fn detect_contacts(
        &mut self,
        bodies: &mut IndexedBodies,
        proxies: &[Vec<Proxy>],
    ) -> (Vec<Contact>, Vec<(usize, usize)>) {
        self.manifolds.clear();
        let candidates: Vec<usize> = (0..bodies.len())
            .filter(|&i| bodies[i].1.in_world && !proxies[i].is_empty())
            .collect();
        let entries: Vec<BroadPhaseEntry> = candidates
            .iter()
            .map(|&i| bounding_entry(&bodies[i].1.transform, &proxies[i]))
            .collect();

        let mut contacts = Vec::new();
        let mut owners = Vec::new();
        for (ci, cj) in SweepAndPrune::pairs(&entries, CONTACT_THRESHOLD) {
            let (i, j) = (candidates[ci], candidates[cj]);
            let (handle_a, a) = &bodies[i];
            let (handle_b, b) = &bodies[j];
            if a.is_static() && b.is_static() {
                continue;
            }
            if !filters_match(a.group, a.mask, b.group, b.mask) {
                continue;
            }
            if self
                .constraints
                .values()
                .any(|joint| joint.ignores_pair(*handle_a, *handle_b))
            {
                continue;
            }

            let mut points = Vec::new();
            for proxy_a in &proxies[i] {
                for proxy_b in &proxies[j] {
                    points.extend(NarrowPhase::manifold(proxy_a, proxy_b, CONTACT_THRESHOLD));
                }
            }
            if points.is_empty() {
                continue;
            }

            let responds = a.has_contact_response() && b.has_contact_response();
            let moving = a.is_simulated() || b.is_simulated();
            let (handle_a, handle_b) = (*handle_a, *handle_b);
            if responds && moving {
                wake_if_touched(bodies, i, j);
                let manifold = self.manifolds.len();
                for (n, point) in points.iter().enumerate() {
                    owners.push((manifold, n));
                    contacts.push(Contact::new(
                        bodies,
                        i,
                        j,
                        point.normal_on_b,
                        point.point_on_a,
                        point.point_on_b,
                        point.distance,
                    ));
                }
            }
            self.manifolds.push(ContactManifold {
                body0: handle_a,
                body1: handle_b,
                points: points
                    .iter()
                    .map(|point| ContactPoint {
                        normal_world_on_b: point.normal_on_b,
                        position_world_on_a: point.point_on_a,
                        position_world_on_b: point.point_on_b,
                        distance: point.distance,
                        applied_impulse: 0.0,
                    })
                    .collect(),
            });
        }
        (contacts, owners)
    }

    fn store_applied_impulses(&mut self, contacts: &[Contact], owners: &[(usize, usize)]) {
        for (contact, &(manifold, point)) in contacts.iter().zip(owners) {
            if let Some(point) = self
                .manifolds
                .get_mut(manifold)
                .and_then(|m| m.points.get_mut(point))
            {
                point.applied_impulse = contact.accumulated_normal_impulse;
            }
        }
    }

    fn step_soft_bodies(&mut self, bodies: &IndexedBodies, index: &HashMap<BodyHandle, usize>, dt: f32) {
        if self.soft.is_empty() {
            return;
        }
        let gravity = self.gravity;
        let transforms = |handle: BodyHandle| index.get(&handle).map(|&i| bodies[i].1.transform);
        for soft in self.soft.values_mut() {
            if !soft.in_world {
                continue;
            }
            let colliders: Vec<Proxy> = bodies
                .iter()
                .filter(|(handle, state)| {
                    state.in_world
                        && state.has_contact_response()
                        && filters_match(soft.group, soft.mask, state.group, state.mask)
                        && !soft
                            .anchors
                            .iter()
                            .any(|anchor| anchor.disable_collision && anchor.body == *handle)
                })
                .flat_map(|(_, state)| self.shapes.proxies(state.shape, &state.transform))
                .collect();
            soft.step(dt, gravity, &colliders, |body, local| {
                transforms(body).map(|transform| transform.transform_point(local))
            });
        }

        for link in &self.cross_links {
            let Some(a) = self.soft.get(&link.body_a).and_then(|s| s.nodes.get(link.node_a)).copied()
            else {
                continue;
            };
            let Some(b) = self.soft.get(&link.body_b).and_then(|s| s.nodes.get(link.node_b)).copied()
            else {
                continue;
            };
            let weight = a.inverse_mass + b.inverse_mass;
            if weight == 0.0 {
                continue;
            }
            let delta = b.position - a.position;
            if let Some(node) = self
                .soft
                .get_mut(&link.body_a)
                .and_then(|s| s.nodes.get_mut(link.node_a))
            {
                node.position += delta * (a.inverse_mass / weight);
            }
            if let Some(node) = self
                .soft
                .get_mut(&link.body_b)
                .and_then(|s| s.nodes.get_mut(link.node_b))
            {
                node.position -= delta * (b.inverse_mass / weight);
            }
        }
    }
}

fn bounding_entry(transform: &Transform, proxies: &[Proxy]) -> BroadPhaseEntry {
    let center = transform.position;
    let radius = proxies
        .iter()
        .map(|proxy| proxy.transform.position.distance(center) + proxy.bounding_radius())
        .fold(0.0_f32, f32::max);
    BroadPhaseEntry { center, radius }
}

/// A moving body touching a sleeping one wakes it up.
fn wake_if_touched(bodies: &mut IndexedBodies, i: usize, j: usize) {
    if let Some(((_, a), (_, b))) = pair_mut(bodies, i, j) {
        if a.is_simulated() && !b.is_static() && !b.is_awake() {
            b.activate();
        }
        if b.is_simulated() && !a.is_static() && !a.is_awake() {
            a.activate();
        }
    }
}

fn solve_joint(joint: &mut Joint, bodies: &mut IndexedBodies, index: &HashMap<BodyHandle, usize>, dt: f32) {
    if !joint.in_world || !joint.enabled {
        return;
    }
    let Some(&ia) = index.get(&joint.body_a) else {
        return;
    };
    let still_intact = match joint.body_b {
        Some(body_b) => {
            let Some(&ib) = index.get(&body_b) else {
                return;
            };
            match pair_mut(bodies, ia, ib) {
                Some(((_, a), (_, b))) => joint.solve(a, Some(b), dt),
                None => true,
            }
        }
        None => joint.solve(&mut bodies[ia].1, None, dt),
    };
    if !still_intact {
        debug!("constraint between {:?} and {:?} broke", joint.body_a, joint.body_b);
    }
}

impl NativeEngine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn create_world(&mut self, config: &WorldConfig) {
        self.world_created = true;
        self.gravity = config.gravity;
        self.accumulator = 0.0;
        debug!(
            "reference world created (softbody: {}, broadphase: {:?})",
            config.softbody, config.broadphase.kind
        );
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn step_simulation(&mut self, time_step: f32, max_sub_steps: u32, fixed_time_step: f32) -> u32 {
        if !self.world_created || time_step <= 0.0 {
            return 0;
        }
        let steps = if max_sub_steps == 0 || fixed_time_step <= 0.0 {
            self.substep(time_step);
            1
        } else {
            self.accumulator += time_step;
            let due = (self.accumulator / fixed_time_step + 1e-4).floor().max(0.0) as u32;
            self.accumulator = (self.accumulator - due as f32 * fixed_time_step).max(0.0);
            let clamped = due.min(max_sub_steps);
            for _ in 0..clamped {
                self.substep(fixed_time_step);
            }
            clamped
        };
        for body in self.rigid.values_mut() {
            body.clear_forces();
        }
        steps
    }

    fn reset_accumulator(&mut self) {
        self.accumulator = 0.0;
    }

    fn create_shape(&mut self, geometry: ShapeGeometry) -> ShapeHandle {
        let handle = ShapeHandle(self.allocate());
        self.shapes.insert(handle, ShapeRecord::new(geometry));
        self.record(NativeCall::CreateShape(handle));
        handle
    }

    fn add_child_shape(&mut self, compound: ShapeHandle, child: ShapeHandle, offset: Transform) {
        if let Some(record) = self.shapes.get_mut(compound) {
            record.children.push((offset, child));
        }
    }

    fn set_local_scaling(&mut self, shape: ShapeHandle, scale: Vec3) {
        if let Some(record) = self.shapes.get_mut(shape) {
            record.scaling = scale;
        }
    }

    fn set_margin(&mut self, shape: ShapeHandle, margin: f32) {
        if let Some(record) = self.shapes.get_mut(shape) {
            record.margin = margin;
        }
    }

    fn calculate_local_inertia(&self, shape: ShapeHandle, mass: f32) -> Vec3 {
        self.shapes.local_inertia(shape, mass)
    }

    fn destroy_shape(&mut self, shape: ShapeHandle) {
        if self.shapes.remove(shape).is_some() {
            self.record(NativeCall::DestroyShape(shape));
        }
    }

    fn create_motion_state(&mut self, transform: Transform) -> MotionStateHandle {
        let handle = MotionStateHandle(self.allocate());
        self.motion_states.insert(handle, transform);
        self.record(NativeCall::CreateMotionState(handle));
        handle
    }

    fn destroy_motion_state(&mut self, state: MotionStateHandle) {
        if self.motion_states.remove(&state).is_some() {
            self.record(NativeCall::DestroyMotionState(state));
        }
    }

    fn create_rigid_body(&mut self, setup: &RigidBodySetup) -> BodyHandle {
        let handle = BodyHandle(self.allocate());
        let transform = self
            .motion_states
            .get(&setup.motion_state)
            .copied()
            .unwrap_or_default();
        self.rigid.insert(handle, RigidState::new(setup, transform));
        self.record(NativeCall::CreateBody(handle));
        handle
    }

    fn add_rigid_body(&mut self, body: BodyHandle, filter: Option<(i32, i32)>) {
        let Some(state) = self.rigid_mut(body) else {
            return;
        };
        let (group, mask) = filter.unwrap_or(if state.is_static() {
            STATIC_FILTER
        } else {
            (DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK)
        });
        state.group = group;
        state.mask = mask;
        state.in_world = true;
        self.record(NativeCall::AddRigidBody(body));
    }

    fn remove_rigid_body(&mut self, body: BodyHandle) {
        let Some(state) = self.rigid_mut(body) else {
            return;
        };
        state.in_world = false;
        self.drop_manifolds_of(body);
        self.record(NativeCall::RemoveRigidBody(body));
    }

    fn destroy_body(&mut self, body: BodyHandle) {
        let existed = self.rigid.remove(&body).is_some() || self.soft.remove(&body).is_some();
        if existed {
            self.cross_links
                .retain(|link| link.body_a != body && link.body_b != body);
            self.drop_manifolds_of(body);
            self.record(NativeCall::DestroyBody(body));
        }
    }

    fn body_shape(&self, body: BodyHandle) -> Option<ShapeHandle> {
        self.rigid.get(&body).map(|state| state.shape)
    }

    fn set_activation_state(&mut self, body: BodyHandle, state: ActivationState) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.set_activation_state(state);
        }
    }

    fn activate(&mut self, body: BodyHandle) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.activate();
        }
    }

    fn is_active(&self, body: BodyHandle) -> bool {
        self.rigid.get(&body).is_some_and(RigidState::is_awake) || self.soft.contains_key(&body)
    }

    fn set_collision_flags(&mut self, body: BodyHandle, flags: u32) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.set_collision_flags(flags);
        }
    }

    fn world_transform(&self, body: BodyHandle) -> Transform {
        self.rigid
            .get(&body)
            .map(|state| state.transform)
            .unwrap_or_default()
    }

    fn set_world_transform(&mut self, body: BodyHandle, transform: Transform) {
        let Some(rigid) = self.rigid_mut(body) else {
            return;
        };
        rigid.transform = transform;
        let motion_state = rigid.motion_state;
        self.motion_states.insert(motion_state, transform);
        if let Some(vehicle) = self.vehicles.values_mut().find(|v| v.chassis == body) {
            vehicle.refresh_transforms(&transform);
        }
    }

    fn velocity(&self, body: BodyHandle) -> Velocity {
        self.rigid
            .get(&body)
            .map(|state| state.velocity)
            .unwrap_or_default()
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.velocity.linear = velocity;
        }
    }

    fn set_angular_velocity(&mut self, body: BodyHandle, velocity: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.velocity.angular = velocity;
        }
    }

    fn set_linear_factor(&mut self, body: BodyHandle, factor: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.linear_factor = factor;
        }
    }

    fn set_angular_factor(&mut self, body: BodyHandle, factor: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.angular_factor = factor;
        }
    }

    fn set_damping(&mut self, body: BodyHandle, linear: f32, angular: f32) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.linear_damping = linear.clamp(0.0, 1.0);
            rigid.angular_damping = angular.clamp(0.0, 1.0);
        }
    }

    fn set_ccd_motion_threshold(&mut self, body: BodyHandle, threshold: f32) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.ccd_motion_threshold = threshold;
        }
    }

    fn set_ccd_swept_sphere_radius(&mut self, body: BodyHandle, radius: f32) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.ccd_swept_sphere_radius = radius;
        }
    }

    fn set_mass_props(&mut self, body: BodyHandle, mass: f32, inertia: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.set_mass_props(mass, inertia);
        }
    }

    fn apply_central_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.apply_central_impulse(impulse);
        }
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3, relative_position: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.apply_impulse(impulse, relative_position);
        }
    }

    fn apply_torque(&mut self, body: BodyHandle, torque: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.apply_torque(torque);
        }
    }

    fn apply_central_force(&mut self, body: BodyHandle, force: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.apply_central_force(force);
        }
    }

    fn apply_force(&mut self, body: BodyHandle, force: Vec3, relative_position: Vec3) {
        if let Some(rigid) = self.rigid_mut(body) {
            rigid.apply_force(force, relative_position);
        }
    }

    fn create_soft_body(&mut self, geometry: &SoftGeometry) -> Option<BodyHandle> {
        let body = SoftBody::from_geometry(geometry)?;
        let handle = BodyHandle(self.allocate());
        self.soft.insert(handle, body);
        self.record(NativeCall::CreateBody(handle));
        Some(handle)
    }

    fn configure_soft_body(&mut self, body: BodyHandle, material: &SoftMaterial) {
        if let Some(soft) = self.soft.get_mut(&body) {
            soft.material = *material;
        }
    }

    fn transform_soft_body(&mut self, body: BodyHandle, transform: Transform, scale: Vec3) {
        if let Some(soft) = self.soft.get_mut(&body) {
            soft.transform(transform, scale);
        }
    }

    fn set_soft_total_mass(&mut self, body: BodyHandle, mass: f32) {
        if let Some(soft) = self.soft.get_mut(&body) {
            soft.set_total_mass(mass);
        }
    }

    fn add_soft_body(&mut self, body: BodyHandle, group: i32, mask: i32) {
        if let Some(soft) = self.soft.get_mut(&body) {
            soft.group = group;
            soft.mask = mask;
            soft.in_world = true;
            self.record(NativeCall::AddSoftBody(body));
        }
    }

    fn remove_soft_body(&mut self, body: BodyHandle) {
        if let Some(soft) = self.soft.get_mut(&body) {
            soft.in_world = false;
            self.record(NativeCall::RemoveSoftBody(body));
        }
    }

    fn soft_nodes(&self, body: BodyHandle) -> Vec<SoftNode> {
        self.soft
            .get(&body)
            .map(SoftBody::exposed_nodes)
            .unwrap_or_default()
    }

    fn soft_faces(&self, body: BodyHandle) -> Vec<[usize; 3]> {
        self.soft
            .get(&body)
            .map(|soft| soft.faces.clone())
            .unwrap_or_default()
    }

    fn append_anchor(
        &mut self,
        body: BodyHandle,
        node: usize,
        rigid: BodyHandle,
        disable_collision: bool,
        influence: f32,
    ) {
        let Some(frame) = self.rigid.get(&rigid).map(|state| state.transform) else {
            return;
        };
        let Some(soft) = self.soft.get_mut(&body) else {
            return;
        };
        let Some(position) = soft.nodes.get(node).map(|n| n.position) else {
            return;
        };
        soft.append_anchor(Anchor {
            node,
            body: rigid,
            local: frame.inverse_transform_point(position),
            influence: influence.clamp(0.0, 1.0),
            disable_collision,
        });
    }

    fn append_link(&mut self, body: BodyHandle, node_a: usize, node_b: usize) {
        if let Some(soft) = self.soft.get_mut(&body) {
            soft.append_link(node_a, node_b);
        }
    }

    fn link_nodes(&mut self, body_a: BodyHandle, node_a: usize, body_b: BodyHandle, node_b: usize) {
        let valid = |body: BodyHandle, node: usize| {
            self.soft
                .get(&body)
                .is_some_and(|soft| node < soft.nodes.len())
        };
        if valid(body_a, node_a) && valid(body_b, node_b) {
            self.cross_links.push(CrossLink {
                body_a,
                node_a,
                body_b,
                node_b,
            });
        }
    }

    fn create_constraint(&mut self, setup: &ConstraintSetup) -> ConstraintHandle {
        let handle = ConstraintHandle(self.allocate());
        self.constraints.insert(handle, Joint::new(setup));
        self.record(NativeCall::CreateConstraint(handle));
        handle
    }

    fn add_constraint(&mut self, constraint: ConstraintHandle, disable_collision: bool) {
        if let Some(joint) = self.constraints.get_mut(&constraint) {
            joint.in_world = true;
            joint.disable_collision = disable_collision;
            self.record(NativeCall::AddConstraint(constraint));
        }
    }

    fn remove_constraint(&mut self, constraint: ConstraintHandle) {
        if let Some(joint) = self.constraints.get_mut(&constraint) {
            joint.in_world = false;
            self.record(NativeCall::RemoveConstraint(constraint));
        }
    }

    fn destroy_constraint(&mut self, constraint: ConstraintHandle) {
        if self.constraints.remove(&constraint).is_some() {
            self.record(NativeCall::DestroyConstraint(constraint));
        }
    }

    fn apply_joint_op(&mut self, constraint: ConstraintHandle, op: &JointOp) {
        if let Some(joint) = self.constraints.get_mut(&constraint) {
            joint.apply(op);
        }
    }

    fn set_breaking_impulse_threshold(&mut self, constraint: ConstraintHandle, threshold: f32) {
        if let Some(joint) = self.constraints.get_mut(&constraint) {
            joint.breaking_threshold = threshold;
        }
    }

    fn breaking_impulse_threshold(&self, constraint: ConstraintHandle) -> f32 {
        self.constraints
            .get(&constraint)
            .map(|joint| joint.breaking_threshold)
            .unwrap_or(f32::MAX)
    }

    fn create_vehicle(&mut self, chassis: BodyHandle, tuning: &VehicleTuning) -> VehicleHandle {
        let handle = VehicleHandle(self.allocate());
        self.vehicles
            .insert(handle, RaycastVehicle::new(chassis, *tuning));
        self.record(NativeCall::CreateVehicle(handle));
        handle
    }

    fn add_vehicle(&mut self, vehicle: VehicleHandle) {
        if let Some(entry) = self.vehicles.get_mut(&vehicle) {
            entry.in_world = true;
            self.record(NativeCall::AddVehicle(vehicle));
        }
    }

    fn remove_vehicle(&mut self, vehicle: VehicleHandle) {
        if let Some(entry) = self.vehicles.get_mut(&vehicle) {
            entry.in_world = false;
            self.record(NativeCall::RemoveVehicle(vehicle));
        }
    }

    fn destroy_vehicle(&mut self, vehicle: VehicleHandle) {
        if self.vehicles.remove(&vehicle).is_some() {
            self.record(NativeCall::DestroyVehicle(vehicle));
        }
    }

    fn add_wheel(&mut self, vehicle: VehicleHandle, wheel: &WheelDescription) -> usize {
        let Some(entry) = self.vehicles.get_mut(&vehicle) else {
            return 0;
        };
        let chassis = self
            .rigid
            .get(&entry.chassis)
            .map(|state| state.transform)
            .unwrap_or_default();
        entry.add_wheel(*wheel, &chassis)
    }

    fn set_steering(&mut self, vehicle: VehicleHandle, wheel: usize, steering: f32) {
        if let Some(wheel) = self.vehicles.get_mut(&vehicle).and_then(|v| v.wheel_mut(wheel)) {
            wheel.steering = steering;
        }
    }

    fn set_brake(&mut self, vehicle: VehicleHandle, wheel: usize, brake: f32) {
        if let Some(wheel) = self.vehicles.get_mut(&vehicle).and_then(|v| v.wheel_mut(wheel)) {
            wheel.brake = brake;
        }
    }

    fn apply_engine_force(&mut self, vehicle: VehicleHandle, wheel: usize, force: f32) {
        if let Some(wheel) = self.vehicles.get_mut(&vehicle).and_then(|v| v.wheel_mut(wheel)) {
            wheel.engine_force = force;
        }
    }

    fn wheel_count(&self, vehicle: VehicleHandle) -> usize {
        self.vehicles
            .get(&vehicle)
            .map(|v| v.wheels.len())
            .unwrap_or(0)
    }

    fn wheel_transform(&self, vehicle: VehicleHandle, wheel: usize) -> Transform {
        self.vehicles
            .get(&vehicle)
            .and_then(|v| v.wheels.get(wheel))
            .map(|wheel| wheel.world)
            .unwrap_or_default()
    }

    fn manifolds(&self) -> &[ContactManifold] {
        &self.manifolds
    }

    fn live_resources(&self) -> ResourceCounts {
        ResourceCounts {
            shapes: self.shapes.len(),
            motion_states: self.motion_states.len(),
            bodies: self.rigid.len() + self.soft.len(),
            constraints: self.constraints.len(),
            vehicles: self.vehicles.len(),
        }
    }
}

/// Loads a fresh [`ReferenceEngine`], optionally journaling its native calls.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLoader {
    journal: Option<Journal>,
}

impl ReferenceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
        }
    }
}

impl EngineLoader for ReferenceLoader {
    fn load(&self, config: &WorldConfig) -> Result<Box<dyn NativeEngine>> {
        debug!("loading reference engine (script: {:?})", config.ammo);
        Ok(Box::new(ReferenceEngine::new(self.journal.clone())))
    }
}
