//! Built-in named fixtures (spec.md §6 / SPEC_FULL.md A5): a default
//! ontology document plus a handful of small hand-authored graphs the CLI
//! and test suite can load by name, in the spirit of the teacher's
//! `test_utils::create_test_repo`.

/// The default ontology configuration document (spec.md §4.1/§6). Declares
/// all ten node kinds with their canonical abbreviations, the six edge
/// kinds with `isNesting` flags and valid-connection tables, and a small
/// rule catalog covering every rule family named in spec.md §4.5.
pub const DEFAULT_ONTOLOGY_JSON: &str = r#"{
  "nodeTypes": [
    { "kind": "SYS", "abbreviation": "SY" },
    { "kind": "UC", "abbreviation": "UC" },
    { "kind": "ACTOR", "abbreviation": "AC" },
    { "kind": "FCHAIN", "abbreviation": "FC" },
    { "kind": "FUNC", "abbreviation": "FN" },
    { "kind": "FLOW", "abbreviation": "FL" },
    { "kind": "REQ", "abbreviation": "RQ" },
    { "kind": "TEST", "abbreviation": "TS" },
    { "kind": "MOD", "abbreviation": "MD" },
    { "kind": "SCHEMA", "abbreviation": "SC" }
  ],
  "edgeTypes": [
    {
      "kind": "compose",
      "isNesting": true,
      "validConnections": [
        { "source": "SYS", "target": "UC" },
        { "source": "SYS", "target": "MOD" },
        { "source": "MOD", "target": "MOD" },
        { "source": "MOD", "target": "FUNC" },
        { "source": "UC", "target": "FCHAIN" },
        { "source": "FCHAIN", "target": "FUNC" }
      ]
    },
    {
      "kind": "io",
      "isNesting": false,
      "validConnections": [
        { "source": "FLOW", "target": "FUNC" },
        { "source": "FUNC", "target": "FLOW" },
        { "source": "FLOW", "target": "ACTOR" },
        { "source": "ACTOR", "target": "FLOW" }
      ]
    },
    {
      "kind": "satisfy",
      "isNesting": true,
      "validConnections": [
        { "source": "FUNC", "target": "REQ" },
        { "source": "MOD", "target": "REQ" },
        { "source": "UC", "target": "REQ" }
      ]
    },
    {
      "kind": "verify",
      "isNesting": false,
      "validConnections": [
        { "source": "TEST", "target": "REQ" },
        { "source": "TEST", "target": "FUNC" }
      ]
    },
    {
      "kind": "allocate",
      "isNesting": true,
      "validConnections": [
        { "source": "FUNC", "target": "MOD" },
        { "source": "REQ", "target": "MOD" }
      ]
    },
    {
      "kind": "relation",
      "isNesting": false,
      "validConnections": [
        { "source": "ANY", "target": "ANY" }
      ]
    }
  ],
  "nestingEdgeTypes": ["compose", "satisfy", "allocate"],
  "zoomLevels": ["L0", "L1", "L2", "L3", "L4"],
  "semanticIdFormat": "^[A-Za-z0-9_+]{1,50}\\.[A-Z]{2}\\.[0-9A-Za-z]+$",
  "validationRules": [
    { "id": "integrity.dangling-edge", "phase": "all", "severity": "hard", "weight": 1.0, "description": "edges must reference existing nodes", "fatal": true },
    { "id": "integrity.invalid-connection", "phase": "all", "severity": "hard", "weight": 1.0, "description": "edge kind must be valid between its endpoint kinds", "fatal": true },
    { "id": "integrity.circular-compose", "phase": "all", "severity": "hard", "weight": 1.0, "description": "compose edges must not cycle", "fatal": true },
    { "id": "naming.pascal-case", "phase": "all", "severity": "soft", "weight": 0.1, "description": "node names should be PascalCase" },
    { "id": "naming.max-length", "phase": "all", "severity": "soft", "weight": 0.05, "description": "node names should stay under 25 characters" },
    { "id": "phase1.req-valid-id", "phase": "phase1_requirements", "severity": "hard", "weight": 1.0, "description": "REQ nodes must have a well-formed semantic id" },
    { "id": "phase1.uc-satisfies-req", "phase": "phase1_requirements", "severity": "soft", "weight": 0.3, "description": "every UC should satisfy a requirement" },
    { "id": "phase2.miller-law-func", "phase": "phase2_logical", "severity": "soft", "weight": 0.2, "description": "a system should have 5-9 top-level FUNC nodes" },
    { "id": "phase2.func-satisfies-req", "phase": "phase2_logical", "severity": "soft", "weight": 0.2, "description": "every FUNC should satisfy a requirement" },
    { "id": "phase2.func-io", "phase": "phase2_logical", "severity": "soft", "weight": 0.2, "description": "every FUNC should have both an input and an output flow" },
    { "id": "phase2.flow-io-both-ends", "phase": "phase2_logical", "severity": "soft", "weight": 0.1, "description": "every FLOW should connect two endpoints" },
    { "id": "phase2.actor-boundary", "phase": "phase2_logical", "severity": "soft", "weight": 0.2, "description": "a function chain should have a complete ACTOR<->FLOW boundary path" },
    { "id": "phase2.no-cross-whitebox-io", "phase": "phase2_logical", "severity": "soft", "weight": 0.3, "description": "functions in different modules should not exchange flows directly", "suggestedOperator": "relocate_func" },
    { "id": "phase2.volatile-fanout", "phase": "phase2_logical", "severity": "soft", "weight": 0.25, "description": "a high-volatility FUNC should have at most two dependents", "suggestedOperator": "extract_volatile" },
    { "id": "phase3.miller-law-mod", "phase": "phase3_physical", "severity": "soft", "weight": 0.2, "description": "a system should have 5-9 top-level MOD nodes", "suggestedOperator": "split_mod" },
    { "id": "phase3.func-allocated", "phase": "phase3_physical", "severity": "soft", "weight": 0.3, "description": "every FUNC should be allocated to exactly one MOD", "suggestedOperator": "add_allocate" },
    { "id": "phase4.req-verified", "phase": "phase4_verification", "severity": "soft", "weight": 0.25, "description": "every REQ should have a verifying TEST", "suggestedOperator": "add_verify" },
    { "id": "phase4.no-orphans", "phase": "phase4_verification", "severity": "soft", "weight": 0.1, "description": "every node should have at least one edge" }
  ],
  "decisionTrees": {}
}"#;

/// A small end-to-end graph used by scenario tests and the CLI's `demo`
/// fixture: one system composing two use cases, one function chain, and a
/// handful of flows/requirements/tests/modules touching every node kind.
pub const DEMO_GRAPH_DIFF: &str = r#"## Nodes
+OrderSystem.SY.001|Order processing system
+PlaceOrder.UC.001|Customer places an order
+Customer.AC.001|The purchasing customer
+PlaceOrderChain.FC.001|Steps taken to place an order
+ValidateCart.FN.001|Validates cart contents [volatility:0.2]
+ChargePayment.FN.002|Charges the customer's card [volatility:0.6]
+CartData.FL.001|Cart contents [dataType:Cart]
+PaymentResult.FL.002|Payment outcome [dataType:Receipt]
+OrdersMustValidate.RQ.001|Every order must pass validation before charge
+ValidateCartTest.TS.001|Exercises cart validation
+OrderModule.MD.001|Order processing module
+CartSchema.SC.001|Cart wire schema

## Edges
OrderSystem.SY.001 -cp-> PlaceOrder.UC.001
OrderSystem.SY.001 -cp-> OrderModule.MD.001
PlaceOrder.UC.001 -cp-> PlaceOrderChain.FC.001
PlaceOrderChain.FC.001 -cp-> ValidateCart.FN.001, ChargePayment.FN.002
OrderModule.MD.001 -cp-> ValidateCart.FN.001
Customer.AC.001 -io-> CartData.FL.001
CartData.FL.001 -io-> ValidateCart.FN.001
ValidateCart.FN.001 -io-> PaymentResult.FL.002
PaymentResult.FL.002 -io-> Customer.AC.001
ValidateCart.FN.001 -sat-> OrdersMustValidate.RQ.001
ValidateCartTest.TS.001 -ver-> OrdersMustValidate.RQ.001
ChargePayment.FN.002 -alc-> OrderModule.MD.001
"#;

/// Second demo graph: deliberately missing an allocate edge and a verify
/// edge so the rule evaluator and optimizer have soft violations to chew on.
pub const DEMO_GRAPH_WITH_VIOLATIONS_DIFF: &str = r#"## Nodes
+Billing.SY.001|Invoicing system
+IssueInvoice.UC.001|Issue an invoice for a completed order
+IssueInvoiceChain.FC.001|Steps taken to issue an invoice
+computeTotal.FN.001|Computes the invoice total [volatility:0.8]
+InvoicesMustBalance.RQ.001|Every invoice total must reconcile with line items
+BillingModule.MD.001|Billing module

## Edges
Billing.SY.001 -cp-> IssueInvoice.UC.001, BillingModule.MD.001
IssueInvoice.UC.001 -cp-> IssueInvoiceChain.FC.001
IssueInvoiceChain.FC.001 -cp-> computeTotal.FN.001
computeTotal.FN.001 -sat-> InvoicesMustBalance.RQ.001
"#;

/// Fixture names recognized by the reference CLI (`architect <name>` /
/// `architect --list`).
pub const FIXTURE_NAMES: [&str; 2] = ["demo", "demo-with-violations"];

/// Resolve a fixture name to its diff text, or `None` if unrecognized.
pub fn fixture_diff(name: &str) -> Option<&'static str> {
    match name {
        "demo" => Some(DEMO_GRAPH_DIFF),
        "demo-with-violations" => Some(DEMO_GRAPH_WITH_VIOLATIONS_DIFF),
        _ => None,
    }
}
