// SPDX-License-Identifier: AGPL-3.0

//! SWC registry metadata for the shipped detection modules.
//! https://swcregistry.io/

#[derive(Debug, Clone)]
pub struct SwcData {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

pub const SWC_UNCHECKED_RETVAL: SwcData = SwcData {
    id: "104",
    title: "Unchecked Call Return Value",
    description: "The return value of a message call is not checked. Execution will resume even if the called contract throws an exception. If the call fails accidentally or an attacker forces the call to fail, this may cause unexpected behaviour in the subsequent program logic",
};

pub const SWC_UNPROTECTED_SELFDESTRUCT: SwcData = SwcData {
    id: "106",
    title: "Unprotected SELFDESTRUCT Instruction",
    description: "Due to missing or insufficient access controls, malicious parties can self-destruct the contract.",
};

pub const SWC_REENTRANCY: SwcData = SwcData {
    id: "107",
    title: "Reentrancy",
    description: "One of the major dangers of calling external contracts is that they can take over the control flow. In the reentrancy attack (a.k.a. recursive call attack), a malicious contract calls back into the calling contract before the first invocation of the function is finished. This may cause the different invocations of the function to interact in undesirable ways.",
};

pub const SWC_TX_ORIGIN: SwcData = SwcData {
    id: "115",
    title: "Authorization through tx.origin",
    description: "tx.origin is a global variable in Solidity which returns the address of the account that sent the transaction. Using the variable for authorization could make a contract vulnerable if an authorized account calls into a malicious contract. A call could be made to the vulnerable contract that passes the authorization check since tx.origin returns the original sender of the transaction which in this case is the authorized account.",
};

pub const SWC_ARBITRARY_JUMP: SwcData = SwcData {
    id: "127",
    title: "Arbitrary Jump with Function Type Variable",
    description: "Solidity supports function types. That is, a variable of function type can be assigned with a reference to a function with a matching signature. The function saved to such variable can be called just like a regular function. The problem arises when a user has the ability to arbitrarily change the function type variable and thus execute random code instructions. As Solidity doesn't support pointer arithmetics, it's impossible to change such variable to an arbitrary value. However, if the developer uses assembly instructions, such as mstore or assign operator, in the worst case scenario an attacker is able to point a function type variable to any code instruction, violating required validations and required state changes.",
};

/// Look up SWC metadata by id.
pub fn swc_data(id: &str) -> Option<&'static SwcData> {
    match id {
        "104" => Some(&SWC_UNCHECKED_RETVAL),
        "106" => Some(&SWC_UNPROTECTED_SELFDESTRUCT),
        "107" => Some(&SWC_REENTRANCY),
        "115" => Some(&SWC_TX_ORIGIN),
        "127" => Some(&SWC_ARBITRARY_JUMP),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup() {
        assert_eq!(swc_data("104").unwrap().id, "104");
        assert_eq!(swc_data("127").unwrap().title, SWC_ARBITRARY_JUMP.title);
        assert!(swc_data("999").is_none());
    }
}
