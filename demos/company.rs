//! Company graph demo
//!
//! Builds a small company model, encodes it, prints the wire tree and
//! decodes it back. The headquarters address is shared between the company
//! and one employee, so it lands in the side table.
//!
//! Run with: cargo run --example company

use anyhow::{bail, Context};
use graph_serde::{validate_references, ClassRegistry, Decoder, Encoder, Record, Value};

fn address(city: &str, street: &str, zip: &str) -> Value {
    Value::record(
        Record::new("Address")
            .with_field("city", city)
            .with_field("street", street)
            .with_field("zipCode", zip),
    )
}

fn employee(name: &str, position: &str, salary: i32, address: Value) -> Value {
    Value::record(
        Record::new("Employee")
            .with_field("name", name)
            .with_field("position", position)
            .with_field("salary", salary)
            .with_field("address", address),
    )
}

fn department(name: &str, employees: Vec<Value>) -> Value {
    Value::record(
        Record::new("Department")
            .with_field("name", name)
            .with_field("employees", Value::array(employees)),
    )
}

fn lookup(value: &Value, path: &[&str]) -> anyhow::Result<Value> {
    path.iter().try_fold(value.clone(), |current, step| {
        let next = match step.parse::<usize>() {
            Ok(index) => current
                .as_array()
                .and_then(|items| items.borrow().get(index).cloned()),
            Err(_) => current.field(step),
        };
        next.with_context(|| format!("missing `{step}` in {}", path.join(".")))
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut registry = ClassRegistry::new();
    registry.register_all(["Company", "Department", "Employee", "Address"]);

    let headquarters = address("New York", "5th Avenue", "10001");
    let company = Value::record(
        Record::new("Company")
            .with_field("name", "Tech Corp")
            .with_field("headquarters", headquarters.clone())
            .with_field(
                "departments",
                Value::array(vec![
                    department(
                        "Engineering",
                        vec![
                            employee("Alice", "Engineer", 80000, headquarters),
                            employee(
                                "Bob",
                                "Engineer",
                                85000,
                                address("San Francisco", "Market Street", "94103"),
                            ),
                        ],
                    ),
                    department(
                        "HR",
                        vec![
                            employee(
                                "Charlie",
                                "HR Manager",
                                60000,
                                address("New York", "Broadway", "10002"),
                            ),
                            employee(
                                "Dave",
                                "Recruiter",
                                55000,
                                address("Boston", "Beacon Hill", "02108"),
                            ),
                        ],
                    ),
                ]),
            ),
    );

    let wire = Encoder::new(&registry).encode(&company)?;
    println!("Serialized company:\n{}", serde_json::to_string_pretty(&wire)?);

    let stats = validate_references(&wire)?;
    println!(
        "{} nodes, {} references, {} side-table entries",
        stats.nodes, stats.references, stats.side_table_entries
    );

    let decoded = Decoder::new(&registry).decode(&wire)?;
    if !decoded.deep_eq(&company) {
        bail!("decoded company differs from the original");
    }

    let show = |label: &str, path: &[&str]| -> anyhow::Result<()> {
        let value = lookup(&decoded, path)?;
        println!("{label}: {}", value.as_str().unwrap_or("<not a string>"));
        Ok(())
    };
    show("Company name", &["name"])?;
    show("First department", &["departments", "0", "name"])?;
    show(
        "First employee in Engineering",
        &["departments", "0", "employees", "0", "name"],
    )?;
    show(
        "Address of first employee in Engineering",
        &["departments", "0", "employees", "0", "address", "street"],
    )?;

    let hq = lookup(&decoded, &["headquarters"])?;
    let alice_home = lookup(&decoded, &["departments", "0", "employees", "0", "address"])?;
    println!(
        "Headquarters shared with Alice's address: {}",
        hq.same_value(&alice_home)
    );
    Ok(())
}
