//! Prompt text sent to the generative service.

/// System instruction for chat turns.
pub const SYSTEM_INSTRUCTION: &str = "\
You are an expert Unreal Engine 5 developer assistant. \
Your goal is to help users write C++ code, understand Blueprints, and solve UE5-specific problems.

Guidelines:
1. When providing C++ code, adhere to UE5 coding standards (prefix classes with A for Actors, U for Objects, F for structs, T for templates).
2. Use UPROPERTY and UFUNCTION macros correctly with appropriate specifiers (e.g. EditAnywhere, BlueprintReadWrite).
3. For Blueprint questions, describe the node logic clearly or suggest specific nodes to use.
4. If the user asks about API specifics, prefer recent UE5 documentation.
5. Keep responses concise and technical but accessible.
6. Format code blocks with language specifiers (cpp, python).";

/// Builds the single-shot prompt for class synthesis.
pub fn class_generation_prompt(class_name: &str, parent_class: &str, features: &str) -> String {
    format!(
        "\
Generate a complete Unreal Engine 5 C++ header (.h) and source (.cpp) file for the following request.

Class Name: {class_name}
Parent Class: {parent_class}
Desired Features/Logic: {features}

Requirements:
- Include necessary headers.
- Use correct prefixes (A{class_name} or U{class_name}).
- Include a constructor.
- Add the generated-body macro.
- Add comments explaining the code.
- Output the result as two distinct code blocks."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_prompt_interpolates_all_fields() {
        let prompt = class_generation_prompt(
            "ExplosiveBarrel",
            "AActor",
            "explodes on death, replicates movement",
        );
        assert!(prompt.contains("Class Name: ExplosiveBarrel"));
        assert!(prompt.contains("Parent Class: AActor"));
        assert!(prompt.contains("explodes on death, replicates movement"));
        assert!(prompt.contains("AExplosiveBarrel or UExplosiveBarrel"));
    }
}
