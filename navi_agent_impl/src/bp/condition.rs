//! Breakpoint condition trees.
//!
//! A condition arrives as a flat list of serialized nodes; each node is
//! `type:u32be`, `operand_len:u32be`, `operand`, `child_count:u32be`,
//! `child_count x child_index:u32be`. Node 0 is the root. The tree is kept
//! as an arena of nodes with child indices, so dropping the arena frees the
//! whole tree.
use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    target::{Address, RegisterContainer, ThreadId},
    AgentError, AgentResult, ErrorCode,
};

const ID_EXPRESSION_NODE: u32 = 0;
const ID_FORMULA_NODE: u32 = 1;
const ID_IDENTIFIER_NODE: u32 = 2;
const ID_MEMORY_NODE: u32 = 3;
const ID_NUMBER_NODE: u32 = 4;
const ID_RELATION_NODE: u32 = 5;
const ID_SUB_NODE: u32 = 6;

/// Reads debuggee memory during evaluation.
pub type MemoryRead<'a> = dyn FnMut(Address, u64) -> AgentResult<Vec<u8>> + 'a;

#[derive(Clone, Debug)]
enum NodeKind {
    Expression(String),
    Formula(String),
    Identifier(String),
    Memory,
    Number(u32),
    Relation(String),
    Sub,
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    children: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct ConditionTree {
    nodes: Vec<Node>,
}

fn invalid() -> AgentError {
    ErrorCode::InvalidConditionTree.into()
}

fn read_operand(rdr: &mut std::io::Cursor<&[u8]>, len: u32) -> AgentResult<String> {
    let mut raw = vec![0_u8; len as usize];
    std::io::Read::read_exact(rdr, &mut raw).map_err(|_| invalid())?;
    String::from_utf8(raw).map_err(|_| invalid())
}

fn read_children(rdr: &mut std::io::Cursor<&[u8]>) -> AgentResult<Vec<u32>> {
    let count = rdr.read_u32::<BigEndian>().map_err(|_| invalid())?;
    if count > 64 {
        warn!("Invalid node found: implausible child count {count}");
        return Err(invalid());
    }
    let mut children = Vec::with_capacity(count as usize);
    for _ in 0..count {
        children.push(rdr.read_u32::<BigEndian>().map_err(|_| invalid())?);
    }
    Ok(children)
}

impl ConditionTree {
    /// Parses the serialized node list. Child indices must point behind
    /// their parent, which rules out cycles.
    pub fn parse(data: &[u8]) -> AgentResult<Self> {
        let mut rdr = std::io::Cursor::new(data);
        let mut nodes = Vec::new();

        while (rdr.position() as usize) < data.len() {
            let node_type = rdr.read_u32::<BigEndian>().map_err(|_| invalid())?;
            let operand_len = rdr.read_u32::<BigEndian>().map_err(|_| invalid())?;
            trace!("Found node with type {node_type}, operand length {operand_len}");

            let kind = match (node_type, operand_len) {
                (ID_EXPRESSION_NODE, 2) => NodeKind::Expression(read_operand(&mut rdr, 2)?),
                (ID_FORMULA_NODE, 1 | 2) => {
                    NodeKind::Formula(read_operand(&mut rdr, operand_len)?)
                }
                (ID_IDENTIFIER_NODE, 1..) => {
                    NodeKind::Identifier(read_operand(&mut rdr, operand_len)?)
                }
                (ID_MEMORY_NODE, 0) => NodeKind::Memory,
                (ID_NUMBER_NODE, 4) => {
                    NodeKind::Number(rdr.read_u32::<BigEndian>().map_err(|_| invalid())?)
                }
                (ID_RELATION_NODE, 1 | 2) => {
                    NodeKind::Relation(read_operand(&mut rdr, operand_len)?)
                }
                (ID_SUB_NODE, 0) => NodeKind::Sub,
                _ => {
                    warn!("Invalid node: type {node_type} with operand length {operand_len}");
                    return Err(invalid());
                }
            };
            let children = read_children(&mut rdr)?;
            nodes.push(Node { kind, children });
        }

        if nodes.is_empty() {
            return Err(invalid());
        }
        #[allow(clippy::cast_possible_truncation)]
        let total = nodes.len() as u32;
        for (index, node) in nodes.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let index = index as u32;
            for child in &node.children {
                if *child <= index || *child >= total {
                    warn!("Invalid node: child {child} of node {index} out of order");
                    return Err(invalid());
                }
            }
        }
        Ok(Self { nodes })
    }

    /// Evaluates the tree against the register snapshot of the given
    /// thread. Any failure during evaluation makes the condition false.
    pub fn is_met(
        &self,
        tid: ThreadId,
        registers: &RegisterContainer,
        memory: &mut MemoryRead<'_>,
    ) -> bool {
        match self.eval(0, tid, registers, memory) {
            Ok(value) => value != 0,
            Err(e) => {
                debug!("Breakpoint condition failed to evaluate ({e}); treating as not met");
                false
            }
        }
    }

    fn child(&self, node: &Node, n: usize) -> AgentResult<u32> {
        node.children.get(n).copied().ok_or_else(invalid)
    }

    fn eval(
        &self,
        index: u32,
        tid: ThreadId,
        registers: &RegisterContainer,
        memory: &mut MemoryRead<'_>,
    ) -> AgentResult<u64> {
        let node = self.nodes.get(index as usize).ok_or_else(invalid)?;
        match &node.kind {
            NodeKind::Number(value) => Ok(u64::from(*value)),
            NodeKind::Identifier(name) => registers
                .value_of(tid, name.trim_end_matches('\0'))
                .ok_or_else(invalid),
            NodeKind::Sub => {
                let child = self.child(node, 0)?;
                self.eval(child, tid, registers, memory)
            }
            NodeKind::Memory => {
                let child = self.child(node, 0)?;
                let address = self.eval(child, tid, registers, memory)?;
                let bytes = memory(address, 4)?;
                let word: [u8; 4] = bytes.as_slice().try_into().map_err(|_| invalid())?;
                Ok(u64::from(u32::from_le_bytes(word)))
            }
            NodeKind::Expression(op) => {
                let lhs = self.eval(self.child(node, 0)?, tid, registers, memory)?;
                let rhs = self.eval(self.child(node, 1)?, tid, registers, memory)?;
                match op.trim_matches(char::from(0)).trim() {
                    "+" => Ok(lhs.wrapping_add(rhs)),
                    "-" => Ok(lhs.wrapping_sub(rhs)),
                    "*" => Ok(lhs.wrapping_mul(rhs)),
                    "/" => lhs.checked_div(rhs).ok_or_else(invalid),
                    "%" => lhs.checked_rem(rhs).ok_or_else(invalid),
                    "<<" => Ok(lhs.wrapping_shl(u32::try_from(rhs).map_err(|_| invalid())?)),
                    ">>" => Ok(lhs.wrapping_shr(u32::try_from(rhs).map_err(|_| invalid())?)),
                    "&" => Ok(lhs & rhs),
                    "|" => Ok(lhs | rhs),
                    "^" => Ok(lhs ^ rhs),
                    other => {
                        warn!("Unknown expression operator {other:?}");
                        Err(invalid())
                    }
                }
            }
            NodeKind::Relation(op) => {
                let lhs = self.eval(self.child(node, 0)?, tid, registers, memory)?;
                let rhs = self.eval(self.child(node, 1)?, tid, registers, memory)?;
                let met = match op.trim_matches(char::from(0)).trim() {
                    "==" | "=" => lhs == rhs,
                    "!=" | "<>" => lhs != rhs,
                    "<" => lhs < rhs,
                    "<=" => lhs <= rhs,
                    ">" => lhs > rhs,
                    ">=" => lhs >= rhs,
                    other => {
                        warn!("Unknown relation operator {other:?}");
                        return Err(invalid());
                    }
                };
                Ok(u64::from(met))
            }
            NodeKind::Formula(op) => match op.trim_matches(char::from(0)).trim() {
                "&&" | "&" => {
                    let lhs = self.eval(self.child(node, 0)?, tid, registers, memory)?;
                    let rhs = self.eval(self.child(node, 1)?, tid, registers, memory)?;
                    Ok(u64::from(lhs != 0 && rhs != 0))
                }
                "||" | "|" => {
                    let lhs = self.eval(self.child(node, 0)?, tid, registers, memory)?;
                    let rhs = self.eval(self.child(node, 1)?, tid, registers, memory)?;
                    Ok(u64::from(lhs != 0 || rhs != 0))
                }
                "!" => {
                    let sub = self.eval(self.child(node, 0)?, tid, registers, memory)?;
                    Ok(u64::from(sub == 0))
                }
                other => {
                    warn!("Unknown formula operator {other:?}");
                    Err(invalid())
                }
            },
        }
    }
}
