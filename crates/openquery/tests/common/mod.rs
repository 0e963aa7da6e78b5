//! Shared fixture for the integration tests: a hand-written record so the
//! tests run with or without the `derive` feature.

#![allow(dead_code)]

use openquery::metadata::cached;
use openquery::{
    Literal, QueryError, Record, RecordMetadata, Related, RelationField, Result, Scalar,
    Timestamp, Value,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Employee {
    pub id: u64,
    pub name: String,
    pub age: Option<i64>,
    pub hired: Option<Timestamp>,
    pub revision: u32,
    pub manager: Option<Box<Employee>>,
    pub team: Vec<Employee>,
}

impl Employee {
    pub fn new(id: u64, name: &str, age: i64) -> Self {
        Employee {
            id,
            name: name.to_string(),
            age: Some(age),
            ..Default::default()
        }
    }
}

impl Record for Employee {
    fn metadata() -> &'static RecordMetadata {
        cached::<Self>(|| {
            RecordMetadata::builder("Employee")
                .key::<u64>("id")
                .scalar::<String>("name")
                .scalar::<Option<i64>>("age")
                .scalar::<Option<Timestamp>>("hired")
                .version::<u32>("revision")
                .relation::<Option<Box<Employee>>>("manager")
                .relation::<Vec<Employee>>("team")
                .build()
        })
    }

    fn record_metadata(&self) -> &'static RecordMetadata {
        Self::metadata()
    }

    fn field_value(&self, field: &str) -> Value<'_> {
        match field {
            "id" => self.id.as_value(),
            "name" => self.name.as_value(),
            "age" => self.age.as_value(),
            "hired" => self.hired.as_value(),
            "revision" => self.revision.as_value(),
            _ => Value::Null,
        }
    }

    fn related(&self, relation: &str) -> Related<'_> {
        match relation {
            "manager" => self.manager.related(),
            "team" => self.team.related(),
            _ => Related::Unknown,
        }
    }

    fn set_field(&mut self, field: &str, value: Literal) -> Result<()> {
        match field {
            "id" => self.id = Scalar::from_literal(value)?,
            "name" => self.name = Scalar::from_literal(value)?,
            "age" => self.age = Scalar::from_literal(value)?,
            "hired" => self.hired = Scalar::from_literal(value)?,
            "revision" => self.revision = Scalar::from_literal(value)?,
            _ => return Err(QueryError::unknown_field(field)),
        }
        Ok(())
    }
}

/// Employees named `e<id>` with the given ages.
pub fn employees(ages: &[(u64, i64)]) -> Vec<Employee> {
    ages.iter()
        .map(|&(id, age)| Employee::new(id, &format!("e{id}"), age))
        .collect()
}

pub fn ids(items: &[Employee]) -> Vec<u64> {
    items.iter().map(|e| e.id).collect()
}
