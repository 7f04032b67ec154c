//! Programs shared by the integration tests

#![allow(dead_code)]

use fpcf_analysis::prelude::*;

/// One class per behavior scenario
pub fn scenario_program() -> Program {
    Program::builder()
        // a class without fields
        .class(ClassBuilder::new("s1.Empty"))
        // a field typed by a generic parameter
        .class(
            ClassBuilder::new("s2.Holder")
                .type_params(["T1"])
                .field(FieldBuilder::new("value", FieldType::param("T1")).private().final_()),
        )
        // "a" + (cond ? "b" : "c")
        .class(ClassBuilder::new("s3.Names").method(
            "pick",
            vec![Stmt::Return(Expr::concat(
                Expr::str("a"),
                Expr::cond(Expr::str("b"), Expr::str("c")),
            ))],
        ))
        // "Field Value:" + Class.forName(..).getField(..).get(..)
        .class(ClassBuilder::new("s4.Reflect").method(
            "describe",
            vec![Stmt::Return(Expr::concat(
                Expr::str("Field Value:"),
                Expr::reflective_field("s4.Target", "secret"),
            ))],
        ))
        // f() = "a" + g(), g() = "b" + f()
        .class(
            ClassBuilder::new("s5.Helpers")
                .method(
                    "f",
                    vec![Stmt::Return(Expr::concat(Expr::str("a"), Expr::call("s5.Helpers.g")))],
                )
                .method(
                    "g",
                    vec![Stmt::Return(Expr::concat(Expr::str("b"), Expr::call("s5.Helpers.f")))],
                ),
        )
        .build()
        .unwrap()
}

pub fn session(program: Program, level: PrecisionLevel, soundness: SoundnessMode) -> AnalysisSession {
    let spec = standard_profile(level, soundness);
    AnalysisSession::for_program(program, &spec, EngineConfig::sequential()).unwrap()
}

/// Every standard kind for every entity of the program
pub fn all_roots(session: &AnalysisSession) -> Vec<PropertyKey> {
    let universe = session.store.universe();
    universe
        .iter()
        .flat_map(|entity| session.kinds.all().map(|kind| PropertyKey::new(entity, kind)))
        .collect()
}
