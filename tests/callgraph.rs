// Fixed-point call-graph construction over hand-built modules. Each module
// is tiny and mirrors a C or C++ shape named in the test.

mod common;

use common::{bitcast_of_function, fn_ptr_ty, function_operand, leaf, FunctionBuilder};
use grapnel::ir::types;
use grapnel::{
    check_whole_program, Arc, Block, BlockName, Callee, ConfigError, Function, GlobalCtor, Icfg,
    IcfgConfig, InstructionName, Invoke, Module, PointsToInfo, ResolverKind, Ret, Terminator,
    TerminatorOpcode, TypeHierarchy, UArc,
};

fn config(resolver: ResolverKind, entries: &[&str]) -> IcfgConfig {
    IcfgConfig {
        entry_points: entries.iter().map(|s| s.to_string()).collect(),
        resolver,
        ..IcfgConfig::default()
    }
}

/// Every edge's call site belongs to its source vertex, and every edge's
/// target is among the recorded callees of that site.
fn assert_edges_well_formed(icfg: &Icfg) {
    for (idx, name) in icfg.graph().vertices() {
        for (target, site) in icfg.graph().out_edges(idx) {
            assert_eq!(site.function(), name);
            let callees = icfg.callees_of_call_at(&site);
            assert!(callees.contains(icfg.graph().function_at(target)));
        }
    }
}

// ------------------------------------------------------------------
// Direct resolution

#[test]
fn direct_call_graph() {
    // void a() { b(); c(); }  void b() { c(); }  void c() {}
    let mut module = Module::new();
    let c = leaf(&mut module, "c");

    let mut fb = FunctionBuilder::new(&mut module, "b");
    let b_call = fb.call(&c, vec![]);
    let b = fb.ret(&mut module, None);

    let mut fb = FunctionBuilder::new(&mut module, "a");
    let call1 = fb.call(&b, vec![]);
    let call2 = fb.call(&c, vec![]);
    let a = fb.ret(&mut module, None);

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["a"]),
    )
    .unwrap();

    let mut functions = icfg.all_functions();
    functions.sort_by(|x, y| x.get().cmp(y.get()));
    assert_eq!(functions, vec![a.clone(), b.clone(), c.clone()]);
    assert_eq!(icfg.graph().edge_count(), 3);

    assert_eq!(icfg.callees_of_call_at(&call1.name), vec![b.clone()]);
    assert_eq!(icfg.callees_of_call_at(&call2.name), vec![c.clone()]);
    assert_eq!(icfg.callees_of_call_at(&b_call.name), vec![c.clone()]);
    assert_eq!(
        icfg.callers_of(&c),
        vec![call2.name.clone(), b_call.name.clone()]
    );

    assert_eq!(
        icfg.calls_from_within(&a),
        vec![call1.name.clone(), call2.name.clone()]
    );
    // Mid-block call: the next instruction. Final call: the terminator.
    assert_eq!(icfg.return_sites_of_call_at(&call1.name), vec![call2.name.clone()]);
    let ret_sites = icfg.return_sites_of_call_at(&call2.name);
    assert_eq!(ret_sites.len(), 1);
    assert!(icfg.return_sites_of_call_at(&call2.name)[0].index() > call2.name.index());

    assert!(!icfg.is_indirect_call(&call1.name));
    assert!(!icfg.is_virtual_call(&call1.name));
    assert!(icfg.unresolved_call_sites().is_empty());
    assert_edges_well_formed(&icfg);
}

#[test]
fn static_resolution_through_bitcast() {
    // void target() {}  void caller() { ((void (*)())target)(); }
    let mut module = Module::new();
    let target = leaf(&mut module, "target");

    let mut fb = FunctionBuilder::new(&mut module, "caller");
    let site = fb.call_through(bitcast_of_function(&target), vec![]);
    let caller = fb.ret(&mut module, None);

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["caller"]),
    )
    .unwrap();

    assert_eq!(icfg.callees_of_call_at(&site.name), vec![target]);
    // Resolved statically, so the site never became an indirect site.
    assert!(icfg.unresolved_call_sites().is_empty());
    // But the callee operand is still not a concrete function.
    assert!(icfg.is_indirect_call(&site.name));
    let _ = caller;
    assert_edges_well_formed(&icfg);
}

// ------------------------------------------------------------------
// Virtual dispatch

/// Builds `caller(B* p) { p->f(); }` with the vtable-read SSA pattern, plus
/// a `B <- D` hierarchy with one override each.
fn virtual_dispatch_module() -> (Module, TypeHierarchy, grapnel::ir::instruction::Instruction) {
    let mut module = Module::new();
    let b_f = leaf(&mut module, "B_f");
    let d_f = leaf(&mut module, "D_f");

    let mut fb = FunctionBuilder::new(&mut module, "caller");
    let p = fb.param("p", types::pointer_to(types::named_struct("struct.B")));
    let vtable_ty = types::pointer_to(fn_ptr_ty());
    let vtable = fb.load(p.clone(), vtable_ty.clone());
    let slot = fb.gep(vtable.result.clone(), 0, vtable_ty);
    let fp = fb.load(slot.result.clone(), fn_ptr_ty());
    let site = fb.call_through(fp.result.clone(), vec![p]);
    fb.ret(&mut module, None);

    let mut th = TypeHierarchy::new();
    th.add_subtype("struct.B", "struct.D");
    th.set_vtable("struct.B", vec![b_f]);
    th.set_vtable("struct.D", vec![d_f]);
    (module, th, site)
}

#[test]
fn virtual_dispatch_cha() {
    let (module, th, site) = virtual_dispatch_module();
    let b_f = module.function_named("B_f").unwrap().clone();
    let d_f = module.function_named("D_f").unwrap().clone();

    let icfg = Icfg::new(module, th, &config(ResolverKind::Cha, &["caller"])).unwrap();

    assert!(icfg.is_virtual_call(&site.name));
    assert!(icfg.is_indirect_call(&site.name));

    let mut callees = icfg.callees_of_call_at(&site.name);
    callees.sort_by(|x, y| x.get().cmp(y.get()));
    assert_eq!(callees, vec![b_f, d_f]);
    // Two parallel edges out of the caller, one per target.
    let caller = icfg.module().function_named("caller").unwrap().clone();
    let vertex = icfg.graph().vertex(&caller).unwrap();
    assert_eq!(icfg.graph().out_edges(vertex).len(), 2);

    assert!(icfg.unresolved_call_sites().is_empty());
    assert_edges_well_formed(&icfg);
}

#[test]
fn virtual_dispatch_rta_requires_instantiation() {
    let (mut module, th, site) = virtual_dispatch_module();
    let d_f = module.function_named("D_f").unwrap().clone();

    // Somewhere in the module a D is instantiated; no B ever is.
    let mut fb = FunctionBuilder::new(&mut module, "maker");
    fb.alloca(types::named_struct("struct.D"));
    fb.ret(&mut module, None);

    let icfg = Icfg::new(module, th, &config(ResolverKind::Rta, &["caller"])).unwrap();
    assert_eq!(icfg.callees_of_call_at(&site.name), vec![d_f]);
}

#[test]
fn virtual_dispatch_dta_restricts_to_reachable_types() {
    // No casts or containment link B and D, so only the receiver's static
    // type remains.
    let (module, th, site) = virtual_dispatch_module();
    let b_f = module.function_named("B_f").unwrap().clone();

    let icfg = Icfg::new(module, th, &config(ResolverKind::Dta, &["caller"])).unwrap();
    assert_eq!(icfg.callees_of_call_at(&site.name), vec![b_f]);
}

#[test]
fn virtual_dispatch_vta_tracks_value_types() {
    // caller() { D d; B* p = (B*)&d; p->f(); } -- the receiver's type set
    // accumulates both the allocation type and the cast target.
    let mut module = Module::new();
    let b_f = leaf(&mut module, "B_f");
    let d_f = leaf(&mut module, "D_f");

    let mut fb = FunctionBuilder::new(&mut module, "caller");
    let obj = fb.alloca(types::named_struct("struct.D"));
    let p = fb.bitcast(
        obj.result.clone(),
        types::pointer_to(types::named_struct("struct.B")),
    );
    let vtable_ty = types::pointer_to(fn_ptr_ty());
    let vtable = fb.load(p.result.clone(), vtable_ty.clone());
    let slot = fb.gep(vtable.result.clone(), 0, vtable_ty);
    let fp = fb.load(slot.result.clone(), fn_ptr_ty());
    let site = fb.call_through(fp.result.clone(), vec![p.result.clone()]);
    fb.ret(&mut module, None);

    let mut th = TypeHierarchy::new();
    th.add_subtype("struct.B", "struct.D");
    th.set_vtable("struct.B", vec![b_f.clone()]);
    th.set_vtable("struct.D", vec![d_f.clone()]);

    let icfg = Icfg::new(module, th, &config(ResolverKind::Vta, &["caller"])).unwrap();
    let mut callees = icfg.callees_of_call_at(&site.name);
    callees.sort_by(|x, y| x.get().cmp(y.get()));
    assert_eq!(callees, vec![b_f, d_f]);
}

#[test]
fn virtual_dispatch_unresolved_without_resolver() {
    let (module, th, site) = virtual_dispatch_module();
    let icfg = Icfg::new(module, th, &config(ResolverKind::NoResolve, &["caller"])).unwrap();
    assert_eq!(icfg.callees_of_call_at(&site.name), vec![]);
    assert_eq!(icfg.unresolved_call_sites(), &[site.name.clone()]);
}

// ------------------------------------------------------------------
// On-the-fly points-to feedback

#[test]
fn otf_resolves_stored_function_pointer() {
    // void g() {}  void caller() { void (*fp)() = g; fp(); }
    let mut module = Module::new();
    let g = leaf(&mut module, "g");

    let mut fb = FunctionBuilder::new(&mut module, "caller");
    let slot = fb.alloca(fn_ptr_ty());
    fb.store(function_operand(&g), slot.result.clone());
    let fp = fb.load(slot.result.clone(), fn_ptr_ty());
    let site = fb.call_through(fp.result.clone(), vec![]);
    fb.ret(&mut module, None);

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::Otf, &["caller"]),
    )
    .unwrap();

    assert_eq!(icfg.callees_of_call_at(&site.name), vec![g.clone()]);
    assert!(icfg.unresolved_call_sites().is_empty());

    // The accumulated points-to information is released read-only, and at
    // the fixed point it yields no target beyond those already recorded.
    let pts = icfg.points_to().expect("otf retains points-to info");
    assert_eq!(
        pts.function_targets(&fp.result).into_iter().collect::<Vec<_>>(),
        vec![g]
    );
    assert_edges_well_formed(&icfg);
}

#[test]
fn otf_resolves_function_table_global() {
    use grapnel::ir::constant::Constant;
    use grapnel::{Global, GlobalName, Operand};

    // void handler() {}  void (*table[1])() = { handler };
    // void caller() { table[0](); }
    let mut module = Module::new();
    let handler = leaf(&mut module, "handler");
    let table = Arc::new(GlobalName::new("table"));
    module.add_global(
        table.clone(),
        Global {
            initializer: Some(Arc::new(Constant::Array(vec![Arc::new(
                Constant::Function(handler.clone()),
            )]))),
            is_const: true,
            ty: types::pointer_to(types::array_of(fn_ptr_ty(), 1)),
        },
    );

    let mut fb = FunctionBuilder::new(&mut module, "caller");
    let table_op = Operand::constant(
        Arc::new(Constant::Global(table)),
        types::pointer_to(types::array_of(fn_ptr_ty(), 1)),
    );
    let fp = fb.load(table_op, fn_ptr_ty());
    let site = fb.call_through(fp.result.clone(), vec![]);
    fb.ret(&mut module, None);

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::Otf, &["caller"]),
    )
    .unwrap();

    assert_eq!(icfg.callees_of_call_at(&site.name), vec![handler]);
    assert!(icfg.unresolved_call_sites().is_empty());
}

// ------------------------------------------------------------------
// Invoke sites

#[test]
fn invoke_edges_and_return_sites() {
    let mut module = Module::new();
    let callee = leaf(&mut module, "callee");

    let thrower = module.intern_function_name("thrower");
    let entry = UArc::new(BlockName::new(thrower.clone(), "entry"));
    let cont = UArc::new(BlockName::new(thrower.clone(), "cont"));
    let lpad = UArc::new(BlockName::new(thrower.clone(), "lpad"));

    let invoke = Terminator::new(
        UArc::new(InstructionName::new(thrower.clone(), entry.clone(), 1)),
        TerminatorOpcode::Invoke(Invoke {
            callee: Callee::Operand(function_operand(&callee)),
            args: vec![],
            return_label: "cont".to_string(),
            unwind_label: "lpad".to_string(),
        }),
        types::void(),
    );
    let ret_of = |block: &UArc<BlockName>| {
        Terminator::new(
            UArc::new(InstructionName::new(thrower.clone(), block.clone(), 1)),
            TerminatorOpcode::Ret(Ret { operand: None }),
            types::void(),
        )
    };
    let cont_ret = ret_of(&cont);
    let lpad_ret = ret_of(&lpad);
    module.add_function(
        thrower.clone(),
        Function {
            parameters: vec![],
            blocks: vec![
                Block {
                    name: entry,
                    instrs: vec![],
                    terminator: Arc::new(invoke.clone()),
                },
                Block {
                    name: cont,
                    instrs: vec![],
                    terminator: Arc::new(cont_ret.clone()),
                },
                Block {
                    name: lpad,
                    instrs: vec![],
                    terminator: Arc::new(lpad_ret.clone()),
                },
            ],
            return_type: types::void(),
            is_var_arg: false,
        },
    );

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["thrower"]),
    )
    .unwrap();

    assert_eq!(icfg.callees_of_call_at(&invoke.name), vec![callee]);
    assert_eq!(icfg.calls_from_within(&thrower), vec![invoke.name.clone()]);
    // Both the normal and the unwind destination are return sites.
    assert_eq!(
        icfg.return_sites_of_call_at(&invoke.name),
        vec![cont_ret.name.clone(), lpad_ret.name.clone()]
    );
}

// ------------------------------------------------------------------
// Entry points and configuration

#[test]
fn all_entry_points_sentinel() {
    let mut module = Module::new();
    leaf(&mut module, "x");
    leaf(&mut module, "y");
    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["__ALL__"]),
    )
    .unwrap();
    assert_eq!(icfg.all_functions().len(), 2);
}

#[test]
fn unknown_entry_point_is_skipped() {
    let mut module = Module::new();
    let a = leaf(&mut module, "a");
    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["a", "does_not_exist"]),
    )
    .unwrap();
    assert_eq!(icfg.all_functions(), vec![a]);
}

#[test]
fn no_entry_points_is_an_error() {
    let mut module = Module::new();
    leaf(&mut module, "a");
    let err = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["does_not_exist"]),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::NoEntryPoints));
}

#[test]
fn include_globals_needs_one_module() {
    let mut cfg = config(ResolverKind::NoResolve, &["main"]);
    cfg.include_globals = true;
    assert!(check_whole_program(1, &cfg).is_ok());
    assert!(matches!(
        check_whole_program(2, &cfg),
        Err(ConfigError::GlobalsRequireSingleModule(2))
    ));
}

// ------------------------------------------------------------------
// Global ctor/dtor model

#[test]
fn global_model_sequences_ctors_entries_dtors() {
    let mut module = Module::new();
    let main = leaf(&mut module, "main");
    let early = leaf(&mut module, "ctor_early");
    let late = leaf(&mut module, "ctor_late");
    let dtor = leaf(&mut module, "dtor");
    module.ctors = vec![
        GlobalCtor {
            priority: 65535,
            function: late.clone(),
        },
        GlobalCtor {
            priority: 101,
            function: early.clone(),
        },
    ];
    module.dtors = vec![GlobalCtor {
        priority: 101,
        function: dtor.clone(),
    }];

    let mut cfg = config(ResolverKind::NoResolve, &["main"]);
    cfg.include_globals = true;
    let icfg = Icfg::new(module, TypeHierarchy::new(), &cfg).unwrap();

    let init = icfg
        .module()
        .function_named(grapnel::icfg::GLOBAL_INIT_MODEL)
        .unwrap()
        .clone();
    let fini = icfg
        .module()
        .function_named(grapnel::icfg::GLOBAL_FINI_MODEL)
        .unwrap()
        .clone();

    // Priority order first, then the user entry, then the dtor runner.
    let order: Vec<_> = icfg
        .calls_from_within(&init)
        .iter()
        .flat_map(|site| icfg.callees_of_call_at(site))
        .collect();
    assert_eq!(order, vec![early, late, main, fini.clone()]);

    let fini_calls: Vec<_> = icfg
        .calls_from_within(&fini)
        .iter()
        .flat_map(|site| icfg.callees_of_call_at(site))
        .collect();
    assert_eq!(fini_calls, vec![dtor]);

    // Everything hangs off the synthetic entry.
    assert!(icfg.graph().vertex(&init).is_some());
    assert_edges_well_formed(&icfg);
}

// ------------------------------------------------------------------
// Export contracts

#[test]
fn dot_export_shape() {
    let mut module = Module::new();
    let b = leaf(&mut module, "b");
    let mut fb = FunctionBuilder::new(&mut module, "a");
    fb.call(&b, vec![]);
    fb.ret(&mut module, None);

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["a"]),
    )
    .unwrap();

    let dot = icfg.to_dot();
    assert!(dot.starts_with("digraph CallGraph{\n"));
    assert!(dot.ends_with("}\n"));
    assert!(dot.contains("[label=\"a\"];"));
    assert!(dot.contains("[label=\"b\"];"));
    assert!(dot.contains("->"));
    assert!(dot.contains("call @b"));
}

#[test]
fn json_export_keeps_parallel_edges() {
    let mut module = Module::new();
    let b = leaf(&mut module, "b");
    let mut fb = FunctionBuilder::new(&mut module, "a");
    fb.call(&b, vec![]);
    fb.call(&b, vec![]);
    fb.ret(&mut module, None);

    let icfg = Icfg::new(
        module,
        TypeHierarchy::new(),
        &config(ResolverKind::NoResolve, &["a"]),
    )
    .unwrap();

    let json = icfg.to_json();
    assert_eq!(json["CallGraph"]["a"], serde_json::json!(["b", "b"]));
    assert_eq!(json["CallGraph"]["b"], serde_json::json!([]));
}

#[test]
fn json_export_respects_configured_id() {
    let mut module = Module::new();
    leaf(&mut module, "a");
    let mut cfg = config(ResolverKind::NoResolve, &["a"]);
    cfg.json_id = "MyGraph".to_string();
    let icfg = Icfg::new(module, TypeHierarchy::new(), &cfg).unwrap();
    assert!(icfg.to_json().get("MyGraph").is_some());
    assert!(icfg.to_json().get("CallGraph").is_none());
}

// ------------------------------------------------------------------
// Determinism

#[test]
fn construction_is_deterministic() {
    let build = || {
        let (module, th, _site) = virtual_dispatch_module();
        let icfg = Icfg::new(module, th, &config(ResolverKind::Cha, &["caller"])).unwrap();
        (
            icfg.graph().vertex_count(),
            icfg.graph().edge_count(),
            icfg.to_dot(),
        )
    };
    let (v1, e1, _dot1) = build();
    let (v2, e2, _dot2) = build();
    assert_eq!(v1, v2);
    assert_eq!(e1, e2);
}
