//! ---
//! ied_section: "03-simulation"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Built-in demonstration relay model."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Demonstration substation: one IED `S1` with logical device `C1` holding
//! four protection relays, a name plate and a measurement unit.

use r_ied_model::{DoDecl, LnDecl, ModelBuilder, TypeDecl};

pub const IED: &str = "S1";
pub const LOGICAL_DEVICE: &str = "C1";
pub const RELAY_NODES: [&str; 4] = ["exampleJSON_1", "exampleJSON_2", "exampleJSON_3", "exampleJSON_4"];
pub const MEASUREMENT_NODE: &str = "exampleMMXU_1";

/// Phase members of a WYE data object, in write order.
pub const PHASES: [&str; 4] = ["phsA", "phsB", "phsC", "neut"];

/// Object reference of `suffix` below relay logical node `node`.
pub fn relay_path(node: &str, suffix: &str) -> String {
    format!("{IED}/{LOGICAL_DEVICE}.{node}.{suffix}")
}

fn wye(object: &mut DoDecl) {
    for phase in PHASES {
        object.data_object(phase, |phs| {
            phs.attribute("cVal", TypeDecl::Vector)
                .attribute("q", TypeDecl::Quality)
                .attribute("t", TypeDecl::Timestamp);
        });
    }
}

fn behaviour(ln: &mut LnDecl) {
    ln.data_object("Beh", |d| {
        d.attribute_with("stVal", TypeDecl::Enum("Beh".into()), "on")
            .attribute("q", TypeDecl::Quality)
            .attribute("t", TypeDecl::Timestamp);
    })
    .data_object("Health", |d| {
        d.attribute_with("stVal", TypeDecl::Enum("Health".into()), "Ok");
    });
}

fn protection_relay(ln: &mut LnDecl) {
    behaviour(ln);
    ln.data_object("Hz", |d| {
        d.attribute("mag", TypeDecl::Float32)
            .attribute("q", TypeDecl::Quality);
    })
    .data_object("PhV", wye)
    .data_object("SeqV", wye)
    .data_object("V1", wye)
    .data_object("SeqA", wye)
    .data_object("A1", wye)
    .data_object("Ind", |d| {
        d.attribute("Trip", TypeDecl::Boolean)
            .attribute("LEDTest", TypeDecl::Boolean)
            .attribute("NumOfAlarms", TypeDecl::Int32);
    })
    .data_object("Attr", |d| {
        d.attribute_with("ActiveSettingGroup", TypeDecl::Int32, "1");
    });
}

/// Declaration of the demonstration relay IED.
pub fn relay_model() -> ModelBuilder {
    ModelBuilder::new()
        .enum_type(
            "Beh",
            [("on", 1), ("blocked", 2), ("test", 3), ("test-blocked", 4), ("off", 5)],
        )
        .enum_type("Health", [("Ok", 1), ("Warning", 2), ("Alarm", 3)])
        .ied(IED, |ied| {
            ied.logical_device(LOGICAL_DEVICE, |ld| {
                ld.logical_node("LN0", |ln| {
                    behaviour(ln);
                    ln.data_object("NamPlt", |d| {
                        d.attribute_with("vendor", TypeDecl::VisString(255), "R-IED")
                            .attribute_with("swRev", TypeDecl::VisString(255), env!("CARGO_PKG_VERSION"))
                            .attribute("configRev", TypeDecl::VisString(255));
                    });
                });
                for node in RELAY_NODES {
                    ld.logical_node(node, protection_relay);
                }
                ld.logical_node(MEASUREMENT_NODE, |ln| {
                    behaviour(ln);
                    ln.data_object("A", |a| {
                        a.data_object("phsA", |phs| {
                            phs.attribute("cVal", TypeDecl::Vector)
                                .attribute("testInteger", TypeDecl::Int32);
                        });
                    });
                });
            });
        })
}
