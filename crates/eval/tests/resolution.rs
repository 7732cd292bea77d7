use hydroctl_core::expand::resolve_scope;
use hydroctl_core::{load_build_state, parse_build_state, InMemoryProvider, LoaderConfig};
use hydroctl_core::{Scope, ScopeKind};
use hydroctl_eval::{Context, Resolve, ResolveError, Resolver};
use std::path::Path;

fn texts(text: &str, ctx: &Context) -> Vec<String> {
    let bs = parse_build_state(Path::new("/m/m.tcf"), text).unwrap();
    bs.resolve(ctx)
        .unwrap()
        .run_state
        .statements
        .iter()
        .map(|s| s.text())
        .collect()
}

#[test]
fn first_matching_branch_wins() {
    let text = "If Scenario == D01\nA == 1\nElse If Scenario == D02\nB == 2\nElse\nC == 3\nEnd If\n";
    let both = Context::new(["D01", "D02"], Vec::<String>::new());
    assert_eq!(texts(text, &both), vec!["A == 1"]);

    let second = Context::new(["D02"], Vec::<String>::new());
    assert_eq!(texts(text, &second), vec!["B == 2"]);

    let neither = Context::new(["D03"], Vec::<String>::new());
    assert_eq!(texts(text, &neither), vec!["C == 3"]);
}

#[test]
fn unassigned_variable_fails_closed() {
    let text = "Set Variable RES == <<X>>\nRead GIS Z Shape == zsh_<<RES>>.shp\n";
    let bs = parse_build_state(Path::new("/m/m.tcf"), text).unwrap();
    let err = bs.resolve(&Context::default()).unwrap_err();
    match err {
        ResolveError::UnresolvedWildcard {
            line, statement, token, ..
        } => {
            assert_eq!(line, 1);
            assert_eq!(statement, "Set Variable RES == <<X>>");
            assert_eq!(token, "<<X>>");
        }
        other => panic!("expected unresolved wildcard, got {:?}", other),
    }
}

#[test]
fn event_block_variable_reaches_scenario_block() {
    let text = "Define Event == Q100\n    Set Variable EVT == 100yr\nEnd Define\n\
                If Scenario == D01\n    Read File == input_<<EVT>>.csv\nEnd If\n";
    let ctx = Context::new(["D01"], ["Q100"]);
    let bs = parse_build_state(Path::new("/m/m.tcf"), text).unwrap();
    let res = bs.resolve(&ctx).unwrap();
    assert_eq!(res.run_state.value_of("Read File"), Some("input_100yr.csv"));
}

#[test]
fn resolving_twice_gives_equal_run_states() {
    let provider = InMemoryProvider::new([
        (
            "/m/runs/m.tcf",
            "Model Scenarios == EXG | 5m\n\
             Set Variable CELL == 5\n\
             Geometry Control File == ..\\model\\geo_<<~s1~>>.tgc\n\
             If Scenario == 5m\nTimestep == 2.5\nElse\nTimestep == 1\nEnd If\n",
        ),
        ("/m/model/geo_EXG.tgc", "Cell Size == <<CELL>>\nRead GIS Code == gis\\2d_code_R.shp\n"),
        ("/m/model/geo_DEV.tgc", "Cell Size == 2\n"),
    ]);
    let bs = load_build_state(Path::new("/m/runs/m.tcf"), &LoaderConfig::with_provider(&provider))
        .unwrap();
    let resolver = Resolver::with_provider(&provider);
    let first = bs.resolve_with(&Context::default(), &resolver).unwrap();
    let second = bs.resolve_with(&Context::default(), &resolver).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.run_state.to_text(), second.run_state.to_text());

    assert_eq!(first.run_state.value_of("Timestep"), Some("2.5"));
    let files = first.run_state.files();
    assert!(files.contains(Path::new("/m/model/geo_EXG.tgc")));
    assert!(files.contains(Path::new("/m/model/gis/2d_code_R.shp")));
    assert!(!files.contains(Path::new("/m/model/geo_DEV.tgc")));
}

#[test]
fn wildcard_names_are_assigned_in_any_candidate_order() {
    let mut s1 = Scope::from_text(ScopeKind::Scenario, "<<~s1~>>");
    let mut s2 = Scope::from_text(ScopeKind::Scenario, "<<~s2~>>");
    let candidates = vec!["5m".to_string(), "EXG".to_string()];
    let found = resolve_scope(
        &mut [&mut s1, &mut s2],
        "2d_code_<<~s1~>>_<<~s2~>>_001.shp",
        "2d_code_EXG_5m_001.shp",
        &candidates,
    );
    assert!(found.is_some());
    assert_eq!(s1.names(), ["EXG"]);
    assert_eq!(s2.names(), ["5m"]);
}

#[test]
fn trd_variables_fold_into_parent() {
    let provider = InMemoryProvider::new([
        (
            "/m/m.tcf",
            "Read File == vars.trd\nCell Size == <<CELL>>\n",
        ),
        ("/m/vars.trd", "Set Variable CELL == 10\n"),
    ]);
    let bs = load_build_state(Path::new("/m/m.tcf"), &LoaderConfig::with_provider(&provider))
        .unwrap();
    let res = bs
        .resolve_with(&Context::default(), &Resolver::with_provider(&provider))
        .unwrap();
    assert_eq!(res.run_state.value_of("Cell Size"), Some("10"));
}

#[test]
fn only_the_trd_variant_read_sets_variables() {
    let provider = InMemoryProvider::new([
        (
            "/m/m.tcf",
            "Read File == vars_<<~s1~>>.trd\nCell Size == <<CELL>>\n",
        ),
        ("/m/vars_5m.trd", "Set Variable CELL == 5\n"),
        ("/m/vars_EXG.trd", "Set Variable CELL == 2\n"),
    ]);
    let bs = load_build_state(Path::new("/m/m.tcf"), &LoaderConfig::with_provider(&provider))
        .unwrap();
    let resolver = Resolver::with_provider(&provider);

    let ctx = Context::from_args(["-s1", "5m", "-s2", "EXG"]).unwrap();
    let res = bs.resolve_with(&ctx, &resolver).unwrap();
    assert_eq!(res.run_state.value_of("Read File"), Some("vars_5m.trd"));
    assert_eq!(res.run_state.value_of("Cell Size"), Some("5"));

    let ctx = Context::from_args(["-s1", "EXG", "-s2", "5m"]).unwrap();
    let res = bs.resolve_with(&ctx, &resolver).unwrap();
    assert_eq!(res.run_state.value_of("Cell Size"), Some("2"));
}

#[test]
fn on_disk_tree_resolves_with_default_resolver() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("m.tcf"),
        "Geometry Control File == geo.tgc\nIf Event == Q100\nEnd Time == 6\nEnd If\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("geo.tgc"), "Cell Size == 5\n").unwrap();

    let bs = load_build_state(&dir.path().join("m.tcf"), &LoaderConfig::default()).unwrap();
    let ctx = Context::from_args(["-e1", "Q100"]).unwrap();
    let res = bs.resolve(&ctx).unwrap();
    assert!(res.is_clean());
    assert_eq!(res.run_state.value_of("End Time"), Some("6"));
    assert_eq!(res.run_state.child_states().count(), 1);
    assert!(res.run_state.to_text().contains("Cell Size == 5"));
}
